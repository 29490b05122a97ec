//! Tracing setup for the two front ends.
//!
//! The CLI logs to stderr so stdout stays clean for `--json`. The TUI owns
//! the terminal, so it writes to a log file in the data directory instead.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "todo-sync.log";

/// Filter used when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "todo_sync=warn";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Log to stderr. `verbose` lowers the default level to `info`.
pub fn init_cli(verbose: bool) {
    let default = if verbose { "todo_sync=info" } else { DEFAULT_FILTER };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

/// Log to `<data_dir>/todo-sync.log`. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init_tui(data_dir: &Path) -> Option<WorkerGuard> {
    if std::fs::create_dir_all(data_dir).is_err() {
        return None;
    }
    let appender = tracing_appender::rolling::never(data_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter("todo_sync=info"))
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(guard)
}
