use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "todo", about = concat!("todo-sync v", env!("CARGO_PKG_VERSION"), " - a task list that works offline"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Don't contact the server; queue every change
    #[arg(long, global = true)]
    pub offline: bool,

    /// Use a different data directory
    #[arg(long = "data-dir", global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log sync activity to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List tasks (refreshes from the server when reachable)
    List(ListArgs),
    /// Add a task
    Add(AddArgs),
    /// Delete a task
    Delete(IdArgs),
    /// Mark a task done, or not done
    Toggle(IdArgs),
    /// Show one task and its pending change
    Show(IdArgs),
    /// Send queued changes to the server
    Sync(SyncArgs),
    /// List pending changes in replay order
    Queue,
    /// Show connectivity and local state
    Status,
    /// Inspect or edit configuration
    Config(ConfigCmd),
    /// View or manage the recovery log
    Recovery(RecoveryCmd),
}

// ---------------------------------------------------------------------------
// Task command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ListArgs {
    /// Only tasks with a change waiting to sync
    #[arg(long)]
    pub pending: bool,
    /// Only completed tasks
    #[arg(long, conflicts_with = "open")]
    pub done: bool,
    /// Only open tasks
    #[arg(long)]
    pub open: bool,
    /// Filter titles by regex (case-insensitive)
    #[arg(long, value_name = "RE")]
    pub grep: Option<String>,
}

#[derive(Args)]
pub struct AddArgs {
    /// Task title (multiple words are joined with spaces)
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,
}

#[derive(Args)]
pub struct IdArgs {
    /// Task id or unique id prefix
    pub id: String,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Keep running and sync whenever the server comes back
    #[arg(long)]
    pub watch: bool,
    /// Seconds between connectivity checks (default: sync.watch_interval_secs)
    #[arg(long, requires = "watch")]
    pub interval: Option<u64>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (default)
    Show,
    /// Print one value
    Get(ConfigGetArgs),
    /// Set one value in config.toml
    Set(ConfigSetArgs),
    /// Print the absolute path to config.toml
    Path,
}

#[derive(Args)]
pub struct ConfigGetArgs {
    /// Dotted key, e.g. api.base_url
    pub key: String,
}

#[derive(Args)]
pub struct ConfigSetArgs {
    /// Dotted key, e.g. sync.offline
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RecoveryCmd {
    #[command(subcommand)]
    pub action: Option<RecoveryAction>,
    /// Maximum number of entries to show (default: 10)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand)]
pub enum RecoveryAction {
    /// Remove old entries
    Prune(RecoveryPruneArgs),
    /// Print the absolute path to the recovery log
    Path,
}

#[derive(Args)]
pub struct RecoveryPruneArgs {
    /// Remove entries older than this timestamp (default: 30 days ago)
    #[arg(long)]
    pub before: Option<String>,
    /// Remove all entries
    #[arg(long)]
    pub all: bool,
}
