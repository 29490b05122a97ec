use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::io::config_io;
use crate::io::lock::StoreLock;
use crate::io::store::LocalStore;
use crate::io::watcher::StoreWatcher;
use crate::model::{Todo, short_id};
use crate::ops::sync::{
    Delivery, Freshness, SyncEngine, SyncError, SyncReport, WatchEvent, watch_tick,
};
use crate::remote::{ApiClient, TodoApi};
use crate::util::text::LineInput;

use super::input::{self, Action};
use super::render;
use super::theme::Theme;

/// Current interaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Navigate,
    /// Typing a new task title
    Input,
}

/// One-line message in the status row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub error: bool,
}

/// Main application state
pub struct App {
    pub data_dir: PathBuf,
    pub todos: Vec<Todo>,
    /// Ids with a change waiting to sync
    pub pending: HashSet<String>,
    pub pending_count: usize,
    pub cursor: usize,
    /// First visible row of the list
    pub scroll_offset: usize,
    pub mode: Mode,
    pub input: LineInput,
    /// Last connectivity result; `None` until the first check
    pub online: Option<bool>,
    pub forced_offline: bool,
    pub status: Option<StatusMessage>,
    pub should_quit: bool,
    pub theme: Theme,
}

impl App {
    pub fn new(data_dir: &Path, forced_offline: bool) -> Self {
        App {
            data_dir: data_dir.to_path_buf(),
            todos: Vec::new(),
            pending: HashSet::new(),
            pending_count: 0,
            cursor: 0,
            scroll_offset: 0,
            mode: Mode::Navigate,
            input: LineInput::default(),
            online: if forced_offline { Some(false) } else { None },
            forced_offline,
            status: None,
            should_quit: false,
            theme: Theme::default(),
        }
    }

    /// Copy the mirror out of the store, keeping the cursor on the same task
    /// when it still exists.
    pub fn load(&mut self, store: &LocalStore) {
        let selected = self.selected().map(|t| t.id.clone());
        self.todos = store.todos().cloned().collect();
        self.pending = store
            .pending()
            .iter()
            .map(|q| q.change.id().to_string())
            .collect();
        self.pending_count = self.pending.len();

        if let Some(id) = selected
            && let Some(idx) = self.todos.iter().position(|t| t.id == id)
        {
            self.cursor = idx;
        }
        self.clamp_cursor();
    }

    pub fn selected(&self) -> Option<&Todo> {
        self.todos.get(self.cursor)
    }

    pub fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.todos.len().saturating_sub(1));
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.status = Some(StatusMessage {
            text: text.into(),
            error: false,
        });
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.status = Some(StatusMessage {
            text: text.into(),
            error: true,
        });
    }

    fn report_delivery(&mut self, what: &str, delivery: &Delivery) {
        match delivery {
            Delivery::Synced => self.info(what.to_string()),
            Delivery::Queued => self.info(format!("{what} (queued, will sync later)")),
            Delivery::Rejected(r) => self.error(format!("{what}: rejected by server ({})", r.message)),
        }
    }

    fn report_sync(&mut self, report: &SyncReport) {
        if !report.rejected.is_empty() {
            self.error(format!(
                "{} change(s) rejected; see `todo recovery`",
                report.rejected.len()
            ));
        } else if report.unreachable {
            self.error("server unreachable; changes stay queued");
        } else if !report.failed.is_empty() {
            self.error(format!("{} change(s) still queued", report.failed.len()));
        } else {
            self.info(format!("synced {} change(s)", report.delivered.len()));
        }
    }
}

/// Run one user intent against the store under the lock, then reload.
pub async fn perform<A: TodoApi + ?Sized>(
    app: &mut App,
    api: &A,
    action: Action,
) -> Result<(), SyncError> {
    let _lock = StoreLock::acquire_async(&app.data_dir, StoreLock::DEFAULT_TIMEOUT).await?;
    let mut store = LocalStore::open(&app.data_dir)?;
    let mut engine = SyncEngine::new(&mut store, api).with_offline(app.forced_offline);

    match action {
        Action::Add(title) => {
            let (todo, delivery) = engine.add(&title).await?;
            app.report_delivery(&format!("added \"{}\"", todo.title), &delivery);
            app.load(engine.store());
            if let Some(idx) = app.todos.iter().position(|t| t.id == todo.id) {
                app.cursor = idx;
            }
            return Ok(());
        }
        Action::Toggle(id) => {
            let (todo, delivery) = engine.toggle(&id).await?;
            let what = if todo.is_completed { "done" } else { "reopened" };
            app.report_delivery(&format!("{what}: {}", todo.title), &delivery);
        }
        Action::Delete(id) => {
            let delivery = engine.delete(&id).await?;
            app.report_delivery(&format!("deleted {}", short_id(&id)), &delivery);
        }
        Action::Sync => {
            let report = engine.sync_queued().await?;
            app.online = Some(!report.unreachable);
            app.report_sync(&report);
        }
        Action::Refresh => match engine.refresh().await? {
            Freshness::Fresh => {
                app.online = Some(true);
                app.info("refreshed");
            }
            Freshness::Cached if app.forced_offline => app.info("offline mode; showing local tasks"),
            Freshness::Cached => {
                app.online = Some(false);
                app.error("server unreachable; showing cached tasks");
            }
        },
    }
    app.load(engine.store());
    Ok(())
}

/// Probe the server and drain the queue when it is reachable.
///
/// The connectivity check runs without the store lock; see [`watch_tick`].
pub async fn tick<A: TodoApi + ?Sized>(
    app: &mut App,
    api: &A,
    lock_wait: Duration,
) -> Result<(), SyncError> {
    if app.forced_offline {
        return Ok(());
    }

    let was_checked = app.online.is_some();
    let mut events = Vec::new();
    let result = watch_tick(&app.data_dir, api, &mut app.online, lock_wait, &mut events).await;
    for event in events {
        match event {
            WatchEvent::Online if was_checked => app.info("back online"),
            WatchEvent::Offline if was_checked => app.error("connection lost; changes will be queued"),
            WatchEvent::Online | WatchEvent::Offline => {}
            WatchEvent::Synced(report) => app.report_sync(&report),
        }
    }
    result?;
    reload(app).await
}

async fn reload(app: &mut App) -> Result<(), SyncError> {
    let _lock = StoreLock::acquire_async(&app.data_dir, StoreLock::DEFAULT_TIMEOUT).await?;
    let store = LocalStore::open(&app.data_dir)?;
    app.load(&store);
    Ok(())
}

/// Run the TUI application
pub async fn run(data_dir: Option<&Path>, offline: bool) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = config_io::resolve_data_dir(data_dir);
    let config = config_io::load_config(&data_dir)?;
    let api = ApiClient::from_config(&config.api)?;
    let _log_guard = crate::logging::init_tui(&data_dir);

    let mut app = App::new(&data_dir, offline || config.sync.offline);
    reload(&mut app).await?;
    let interval = Duration::from_secs(config.sync.watch_interval_secs.max(1));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    // Install panic hook to restore terminal on panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let result = run_event_loop(&mut terminal, &mut app, &api, interval).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    api: &ApiClient,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    // Reload when another process (the CLI) writes the store
    let watcher = match StoreWatcher::start(&app.data_dir) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "file watching unavailable");
            None
        }
    };

    terminal.draw(|frame| render::render(frame, app))?;
    if let Err(e) = perform(app, api, Action::Refresh).await {
        app.error(e.to_string());
    }
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|frame| render::render(frame, app))?;

        if event::poll(Duration::from_millis(250))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && let Some(action) = input::handle_key(app, key)
        {
            app.info("working\u{2026}");
            terminal.draw(|frame| render::render(frame, app))?;
            if let Err(e) = perform(app, api, action).await {
                app.error(e.to_string());
            }
        }

        if app.should_quit {
            break;
        }

        if last_tick.elapsed() >= interval {
            last_tick = Instant::now();
            if let Err(e) = tick(app, api, interval.min(StoreLock::DEFAULT_TIMEOUT)).await {
                tracing::warn!(error = %e, "connectivity check failed");
            }
        }

        if watcher.as_ref().is_some_and(|w| w.poll_changed())
            && let Err(e) = reload(app).await
        {
            app.error(e.to_string());
        }
    }
    Ok(())
}
