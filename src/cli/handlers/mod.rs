use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io::{self, ConfigError};
use crate::io::lock::StoreLock;
use crate::io::recovery;
use crate::io::store::LocalStore;
use crate::model::ClientConfig;
use crate::ops::sync::{SyncEngine, WatchEvent, watch};
use crate::ops::todo_ops::{self, ListFilter};
use crate::remote::{ApiClient, TodoApi};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub async fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let ctx = Context::load(cli.data_dir, cli.offline)?;

    match cli.command {
        None => Err("no subcommand given (try `todo --help`)".into()),
        Some(cmd) => match cmd {
            // Reads
            Commands::List(args) => cmd_list(&ctx, args, json).await,
            Commands::Show(args) => cmd_show(&ctx, args, json).await,
            Commands::Queue => cmd_queue(&ctx, json).await,
            Commands::Status => cmd_status(&ctx, json).await,

            // Writes
            Commands::Add(args) => cmd_add(&ctx, args, json).await,
            Commands::Delete(args) => cmd_delete(&ctx, args, json).await,
            Commands::Toggle(args) => cmd_toggle(&ctx, args, json).await,
            Commands::Sync(args) => cmd_sync(&ctx, args, json).await,

            // Maintenance
            Commands::Config(args) => cmd_config(&ctx, args, json),
            Commands::Recovery(args) => cmd_recovery(&ctx, args, json),
        },
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a command needs: where data lives, what the config says, and
/// how to reach the server.
pub struct Context {
    pub data_dir: PathBuf,
    pub config: ClientConfig,
    /// `--offline` flag or `sync.offline`
    pub offline: bool,
}

impl Context {
    pub fn load(data_dir: Option<PathBuf>, offline_flag: bool) -> Result<Self, ConfigError> {
        let data_dir = config_io::resolve_data_dir(data_dir.as_deref());
        let config = config_io::load_config(&data_dir)?;
        let offline = offline_flag || config.sync.offline;
        Ok(Context {
            data_dir,
            config,
            offline,
        })
    }

    pub fn api(&self) -> Result<ApiClient, crate::remote::ApiError> {
        ApiClient::from_config(&self.config.api)
    }

    /// Lock the data directory and load the store
    async fn open_store(&self) -> Result<(StoreLock, LocalStore), Box<dyn std::error::Error>> {
        let lock = StoreLock::acquire_async(&self.data_dir, StoreLock::DEFAULT_TIMEOUT).await?;
        let store = LocalStore::open(&self.data_dir)?;
        Ok((lock, store))
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

async fn cmd_list(ctx: &Context, args: ListArgs, json: bool) -> CmdResult {
    let api = ctx.api()?;
    let (_lock, mut store) = ctx.open_store().await?;
    let freshness = SyncEngine::new(&mut store, &api)
        .with_offline(ctx.offline)
        .refresh()
        .await?;

    let filter = ListFilter {
        pending_only: args.pending,
        completed: if args.done {
            Some(true)
        } else if args.open {
            Some(false)
        } else {
            None
        },
        title: args
            .grep
            .as_deref()
            .map(ListFilter::title_pattern)
            .transpose()?,
    };
    let todos = todo_ops::filter_todos(&store, &filter);

    if json {
        return print_json(&ListJson {
            source: freshness,
            todos: todos.iter().map(|t| todo_to_json(&store, t)).collect(),
        });
    }
    for todo in &todos {
        println!(
            "{}",
            format_todo_line(todo, store.pending_for(&todo.id).is_some())
        );
    }
    if todos.is_empty() {
        println!("no tasks");
    }
    if freshness == crate::ops::sync::Freshness::Cached && !ctx.offline {
        eprintln!("(server unreachable; showing cached tasks)");
    }
    Ok(())
}

async fn cmd_show(ctx: &Context, args: IdArgs, json: bool) -> CmdResult {
    let (_lock, store) = ctx.open_store().await?;
    let id = todo_ops::resolve_id(&store, &args.id)?;
    let todo = store
        .get(&id)
        .ok_or_else(|| format!("task not found: {}", args.id))?;

    if json {
        return print_json(&todo_to_json(&store, todo));
    }
    for line in format_todo_detail(todo, store.pending_for(&id)) {
        println!("{}", line);
    }
    Ok(())
}

async fn cmd_queue(ctx: &Context, json: bool) -> CmdResult {
    let (_lock, store) = ctx.open_store().await?;
    let pending = store.pending();

    if json {
        return print_json(&pending);
    }
    if pending.is_empty() {
        println!("nothing queued");
    }
    for (i, queued) in pending.iter().enumerate() {
        println!("{}", format_queue_line(i + 1, queued));
    }
    Ok(())
}

async fn cmd_status(ctx: &Context, json: bool) -> CmdResult {
    let api = ctx.api()?;
    let online = !ctx.offline && api.probe().await;
    let (_lock, store) = ctx.open_store().await?;

    let status = StatusJson {
        online,
        forced_offline: ctx.offline,
        api: api.base_url(),
        data_dir: ctx.data_dir.display().to_string(),
        stats: todo_ops::stats(&store),
    };
    if json {
        return print_json(&status);
    }
    for line in format_status(&status) {
        println!("{}", line);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

async fn cmd_add(ctx: &Context, args: AddArgs, json: bool) -> CmdResult {
    let api = ctx.api()?;
    let (_lock, mut store) = ctx.open_store().await?;
    let mut engine = SyncEngine::new(&mut store, &api).with_offline(ctx.offline);
    let (todo, delivery) = engine.add(&args.title.join(" ")).await?;

    if json {
        let store = engine.store();
        return print_json(&ChangeResultJson::new(
            &todo.id,
            Some(todo_to_json(store, &todo)),
            &delivery,
        ));
    }
    println!("{}  {}{}", todo.short_id(), todo.title, delivery_note(&delivery));
    Ok(())
}

async fn cmd_delete(ctx: &Context, args: IdArgs, json: bool) -> CmdResult {
    let api = ctx.api()?;
    let (_lock, mut store) = ctx.open_store().await?;
    let id = todo_ops::resolve_id(&store, &args.id)?;
    let delivery = SyncEngine::new(&mut store, &api)
        .with_offline(ctx.offline)
        .delete(&id)
        .await?;

    if json {
        return print_json(&ChangeResultJson::new(&id, None, &delivery));
    }
    println!(
        "deleted {}{}",
        crate::model::short_id(&id),
        delivery_note(&delivery)
    );
    Ok(())
}

async fn cmd_toggle(ctx: &Context, args: IdArgs, json: bool) -> CmdResult {
    let api = ctx.api()?;
    let (_lock, mut store) = ctx.open_store().await?;
    let id = todo_ops::resolve_id(&store, &args.id)?;
    let mut engine = SyncEngine::new(&mut store, &api).with_offline(ctx.offline);
    let (todo, delivery) = engine.toggle(&id).await?;

    if json {
        let store = engine.store();
        return print_json(&ChangeResultJson::new(
            &todo.id,
            Some(todo_to_json(store, &todo)),
            &delivery,
        ));
    }
    println!(
        "{}{}",
        format_todo_line(&todo, false),
        delivery_note(&delivery)
    );
    Ok(())
}

async fn cmd_sync(ctx: &Context, args: SyncArgs, json: bool) -> CmdResult {
    let api = ctx.api()?;

    if args.watch {
        if ctx.offline {
            return Err(crate::ops::sync::SyncError::ForcedOffline.into());
        }
        let secs = args
            .interval
            .unwrap_or(ctx.config.sync.watch_interval_secs)
            .max(1);
        eprintln!(
            "watching {} every {}s (Ctrl-C to stop)",
            api.base_url(),
            secs
        );
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        watch(
            &ctx.data_dir,
            &api,
            Duration::from_secs(secs),
            shutdown,
            |event| print_watch_event(event, json),
        )
        .await;
        return Ok(());
    }

    let (_lock, mut store) = ctx.open_store().await?;
    let report = SyncEngine::new(&mut store, &api)
        .with_offline(ctx.offline)
        .sync_queued()
        .await?;

    if json {
        return print_json(&report);
    }
    for line in format_sync_report(&report) {
        println!("{}", line);
    }
    Ok(())
}

fn print_watch_event(event: &WatchEvent, json: bool) {
    if json {
        let value = match event {
            WatchEvent::Online => serde_json::json!({ "event": "online" }),
            WatchEvent::Offline => serde_json::json!({ "event": "offline" }),
            WatchEvent::Synced(report) => serde_json::json!({ "event": "synced", "report": report }),
        };
        println!("{}", value);
        return;
    }
    let stamp = Utc::now().format("%H:%M:%S");
    match event {
        WatchEvent::Online => println!("{} server reachable", stamp),
        WatchEvent::Offline => println!("{} server unreachable", stamp),
        WatchEvent::Synced(report) => {
            for line in format_sync_report(report) {
                println!("{} {}", stamp, line);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config(ctx: &Context, args: ConfigCmd, json: bool) -> CmdResult {
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            if json {
                return print_json(&ctx.config);
            }
            print!("{}", toml::to_string_pretty(&ctx.config)?);
            Ok(())
        }
        ConfigAction::Get(a) => {
            let value = ctx
                .config
                .get(&a.key)
                .ok_or_else(|| ConfigError::UnknownKey(a.key.clone()))?;
            if json {
                return print_json(&serde_json::json!({ "key": a.key, "value": value }));
            }
            println!("{}", value);
            Ok(())
        }
        ConfigAction::Set(a) => {
            config_io::set_config_value(&ctx.data_dir, &a.key, &a.value)?;
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", config_io::config_path(&ctx.data_dir).display());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

fn cmd_recovery(ctx: &Context, args: RecoveryCmd, json: bool) -> CmdResult {
    match args.action {
        Some(RecoveryAction::Path) => {
            println!("{}", recovery::recovery_log_path(&ctx.data_dir).display());
            Ok(())
        }
        Some(RecoveryAction::Prune(prune)) => {
            let before = prune
                .before
                .as_deref()
                .map(parse_timestamp)
                .transpose()?;
            let removed = recovery::prune_recovery(&ctx.data_dir, before, prune.all)?;
            println!("removed {} entr{}", removed, if removed == 1 { "y" } else { "ies" });
            Ok(())
        }
        None => {
            let entries =
                recovery::read_recovery_entries(&ctx.data_dir, Some(args.limit.unwrap_or(10)));
            if json {
                let values: Vec<_> = entries.iter().map(|e| e.to_json()).collect();
                return print_json(&values);
            }
            if entries.is_empty() {
                println!("recovery log is empty");
            }
            for entry in &entries {
                print!("{}", entry.to_markdown());
            }
            Ok(())
        }
    }
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC)
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{}': expected RFC 3339 or YYYY-MM-DD", s))
}
