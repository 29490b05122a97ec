//! Offline-first reconciliation between the local store and the API.
//!
//! Every user intent follows the same path: update the mirror, queue the
//! change, save, then try to deliver. Delivery drains the whole queue in FIFO
//! order so older offline changes reach the server before newer ones. A change
//! stays queued until the server accepts it (at-least-once), and nothing is
//! merged: the last write to reach the server wins.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

use crate::io::lock::StoreLock;
use crate::io::recovery::{RecoveryCategory, RecoveryEntry, log_recovery};
use crate::io::store::{LocalStore, StoreError};
use crate::model::{PendingChange, QueuedChange, Todo};
use crate::remote::{ApiError, TodoApi};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("task title cannot be empty")]
    EmptyTitle,
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("'{prefix}' matches {count} tasks; use more characters")]
    Ambiguous { prefix: String, count: usize },
    #[error("offline mode is on; unset it with `todo config set sync.offline false`")]
    ForcedOffline,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lock(#[from] crate::io::lock::LockError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// What happened to a change right after the user made it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "delivery", rename_all = "lowercase")]
pub enum Delivery {
    /// The server has it
    Synced,
    /// Kept in the queue for a later sync
    Queued,
    /// The server refused it; the change was dropped and logged
    Rejected(Rejection),
}

/// Where the mirror's contents came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Rebuilt from the server list just now
    Fresh,
    /// The server could not be reached; showing the cached mirror
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub id: String,
    pub kind: &'static str,
    pub status: Option<u16>,
    pub message: String,
}

/// Outcome of draining the queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Ids whose change the server accepted (or already had)
    pub delivered: Vec<String>,
    /// Ids still queued after a retryable failure
    pub failed: Vec<String>,
    pub rejected: Vec<Rejection>,
    /// The drain stopped early because the server was unreachable
    pub unreachable: bool,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty()
    }
}

/// Drives one store against one API.
pub struct SyncEngine<'a, A: TodoApi + ?Sized> {
    store: &'a mut LocalStore,
    api: &'a A,
    offline: bool,
}

impl<'a, A: TodoApi + ?Sized> SyncEngine<'a, A> {
    pub fn new(store: &'a mut LocalStore, api: &'a A) -> Self {
        SyncEngine {
            store,
            api,
            offline: false,
        }
    }

    /// Never touch the network; every change stays queued.
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn store(&self) -> &LocalStore {
        self.store
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Rebuild the mirror from the server list, overlaid with pending changes.
    ///
    /// Falls back to the cached mirror when offline or when the server can't
    /// be reached. A server that answers with garbage or a refusal is an error.
    pub async fn refresh(&mut self) -> Result<Freshness, SyncError> {
        if self.offline {
            return Ok(Freshness::Cached);
        }
        match self.api.list().await {
            Ok(server) => {
                let merged = reconcile(server, &self.store.pending());
                self.store.replace_all(merged);
                self.store.save()?;
                Ok(Freshness::Fresh)
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "could not fetch tasks; using local cache");
                Ok(Freshness::Cached)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn refresh_quietly(&mut self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "refresh after sync failed");
        }
    }

    // -----------------------------------------------------------------------
    // Intents
    // -----------------------------------------------------------------------

    /// Add a task. Returns the new task and what happened to it.
    pub async fn add(&mut self, title: &str) -> Result<(Todo, Delivery), SyncError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SyncError::EmptyTitle);
        }
        let todo = Todo::new(title);
        self.store.put_todo(todo.clone());
        self.store.queue_change(PendingChange::Add {
            id: todo.id.clone(),
            todo: todo.clone(),
        });
        self.store.save()?;

        let delivery = self.deliver(&todo.id).await?;
        Ok((todo, delivery))
    }

    /// Delete a task by full id.
    pub async fn delete(&mut self, id: &str) -> Result<Delivery, SyncError> {
        self.store
            .delete_todo(id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        self.store
            .queue_change(PendingChange::Delete { id: id.to_string() });
        self.store.save()?;

        self.deliver(id).await
    }

    /// Flip a task's completion flag. Returns the updated task.
    pub async fn toggle(&mut self, id: &str) -> Result<(Todo, Delivery), SyncError> {
        let mut todo = self
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        todo.is_completed = !todo.is_completed;
        self.store.put_todo(todo.clone());
        self.store.queue_change(PendingChange::Update {
            id: id.to_string(),
            is_completed: todo.is_completed,
        });
        self.store.save()?;

        let delivery = self.deliver(id).await?;
        Ok((todo, delivery))
    }

    async fn deliver(&mut self, id: &str) -> Result<Delivery, SyncError> {
        if self.store.pending_for(id).is_none() {
            // Cancelled out in the queue (e.g. deleting a task never sent)
            return Ok(Delivery::Synced);
        }
        if self.offline {
            tracing::info!(id, "offline mode; change queued");
            return Ok(Delivery::Queued);
        }

        let report = self.drain().await?;
        if !report.unreachable {
            self.refresh_quietly().await;
        }

        if let Some(rejection) = report.rejected.into_iter().find(|r| r.id == id) {
            return Ok(Delivery::Rejected(rejection));
        }
        if self.store.pending_for(id).is_some() {
            tracing::warn!(id, "change queued for background sync");
            Ok(Delivery::Queued)
        } else {
            Ok(Delivery::Synced)
        }
    }

    // -----------------------------------------------------------------------
    // Queue replay
    // -----------------------------------------------------------------------

    /// Replay every queued change, then refresh the mirror.
    pub async fn sync_queued(&mut self) -> Result<SyncReport, SyncError> {
        if self.offline {
            return Err(SyncError::ForcedOffline);
        }
        let report = self.drain().await?;
        if !report.unreachable {
            self.refresh_quietly().await;
        }
        Ok(report)
    }

    /// Send queued changes one at a time in FIFO order.
    ///
    /// A connectivity failure stops the drain; the remaining entries would
    /// fail the same way. Other retryable failures leave the entry queued and
    /// move on. Refusals drop the entry and record it in the recovery log.
    async fn drain(&mut self) -> Result<SyncReport, SyncError> {
        let queue: Vec<QueuedChange> = self.store.pending().into_iter().cloned().collect();
        let mut report = SyncReport::default();

        for (i, queued) in queue.iter().enumerate() {
            let change = &queued.change;
            let id = change.id().to_string();

            match self.send(change).await {
                Ok(()) => {
                    tracing::info!(id = %id, kind = change.kind(), "change delivered");
                    self.store.clear_change(&id);
                    report.delivered.push(id);
                }
                Err(e) if already_applied(change, &e) => {
                    tracing::info!(id = %id, kind = change.kind(), error = %e, "server already reflects change");
                    self.store.clear_change(&id);
                    report.delivered.push(id);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(id = %id, kind = change.kind(), error = %e, "change left queued");
                    report.failed.push(id);
                    if matches!(e, ApiError::Offline { .. } | ApiError::Timeout { .. }) {
                        report.unreachable = true;
                        report
                            .failed
                            .extend(queue[i + 1..].iter().map(|q| q.change.id().to_string()));
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(id = %id, kind = change.kind(), error = %e, "server rejected change; dropped");
                    self.store.clear_change(&id);
                    log_recovery(
                        self.store.data_dir(),
                        RecoveryEntry::new(
                            RecoveryCategory::Rejected,
                            format!("{} refused by server", change.kind()),
                        )
                        .field("Task", id.clone())
                        .field("Error", e.to_string())
                        .body(serde_json::to_string_pretty(change).unwrap_or_default()),
                    );
                    report.rejected.push(Rejection {
                        id,
                        kind: change.kind(),
                        status: e.status(),
                        message: e.to_string(),
                    });
                }
            }
            self.store.save()?;
        }

        Ok(report)
    }

    async fn send(&self, change: &PendingChange) -> Result<(), ApiError> {
        match change {
            PendingChange::Add { todo, .. } => self.api.create(todo).await,
            PendingChange::Delete { id } => self.api.delete(id).await,
            PendingChange::Update { id, is_completed } => {
                self.api.set_completed(id, *is_completed).await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reconnect detection
// ---------------------------------------------------------------------------

/// Connectivity transitions and sync results from [`watch_tick`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Online,
    Offline,
    Synced(SyncReport),
}

/// One connectivity check against the store in `data_dir`.
///
/// The connectivity check runs without the store lock, so a slow or
/// blackholed server never blocks other processes. The lock is taken (waiting
/// at most `lock_wait`) only when the server answered and changes are queued.
/// Events are pushed as they happen, so a failure in the sync step still
/// leaves the transition in `events`.
pub async fn watch_tick<A: TodoApi + ?Sized>(
    data_dir: &Path,
    api: &A,
    last: &mut Option<bool>,
    lock_wait: Duration,
    events: &mut Vec<WatchEvent>,
) -> Result<(), SyncError> {
    let online = api.probe().await;
    match (*last, online) {
        (Some(false) | None, true) => {
            tracing::info!("server reachable");
            events.push(WatchEvent::Online);
        }
        (Some(true) | None, false) => {
            tracing::warn!("server unreachable");
            events.push(WatchEvent::Offline);
        }
        _ => {}
    }
    *last = Some(online);

    if !online || LocalStore::queued_count(data_dir)? == 0 {
        return Ok(());
    }

    let _lock = StoreLock::acquire_async(data_dir, lock_wait).await?;
    let mut store = LocalStore::open(data_dir)?;
    if store.pending_count() > 0 {
        let report = SyncEngine::new(&mut store, api).sync_queued().await?;
        events.push(WatchEvent::Synced(report));
    }
    Ok(())
}

/// Poll connectivity every `interval` until `shutdown` resolves, replaying the
/// queue whenever the server is reachable.
///
/// The store is re-read on each tick so changes queued by other processes are
/// picked up. A failed tick (the lock is busy, the store can't be written) is
/// logged and retried on the next one; only `shutdown` ends the loop.
pub async fn watch<A, F, E>(
    data_dir: &Path,
    api: &A,
    interval: Duration,
    shutdown: F,
    mut on_event: E,
) where
    A: TodoApi + ?Sized,
    F: Future<Output = ()>,
    E: FnMut(&WatchEvent),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);
    let lock_wait = interval.min(StoreLock::DEFAULT_TIMEOUT);
    let mut last = None;

    loop {
        let mut events = Vec::new();
        let tick = async {
            ticker.tick().await;
            watch_tick(data_dir, api, &mut last, lock_wait, &mut events).await
        };
        let result = tokio::select! {
            _ = &mut shutdown => return,
            result = tick => result,
        };
        for event in &events {
            on_event(event);
        }
        if let Err(e) = result {
            tracing::warn!(error = %e, "sync check failed; retrying next tick");
        }
    }
}

/// Errors meaning the server already reflects the change.
fn already_applied(change: &PendingChange, err: &ApiError) -> bool {
    matches!(
        (change, err.status()),
        (PendingChange::Add { .. }, Some(409))
            | (PendingChange::Delete { .. }, Some(404))
            | (PendingChange::Update { .. }, Some(404))
    )
}

/// Overlay queued changes on the server's list (last writer wins).
///
/// Pending adds missing on the server are appended, pending deletes hide the
/// task, pending updates override the server's completion flag.
pub fn reconcile(server: Vec<Todo>, pending: &[&QueuedChange]) -> Vec<Todo> {
    let mut todos: IndexMap<String, Todo> =
        server.into_iter().map(|t| (t.id.clone(), t)).collect();

    for queued in pending {
        match &queued.change {
            PendingChange::Add { id, todo } => {
                todos.entry(id.clone()).or_insert_with(|| todo.clone());
            }
            PendingChange::Delete { id } => {
                todos.shift_remove(id);
            }
            PendingChange::Update { id, is_completed } => {
                if let Some(todo) = todos.get_mut(id) {
                    todo.is_completed = *is_completed;
                }
            }
        }
    }

    todos.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::recovery::read_recovery_entries;
    use crate::remote::fake::FakeApi;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn todo(id: &str, title: &str, done: bool) -> Todo {
        Todo {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            is_completed: done,
        }
    }

    fn titles(store: &LocalStore) -> Vec<String> {
        store.todos().map(|t| t.title.clone()).collect()
    }

    #[tokio::test]
    async fn refresh_mirrors_server() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        store.put_todo(todo("stale", "Stale", false));
        let api = FakeApi::online(vec![todo("1", "One", false), todo("2", "Two", true)]);

        let freshness = SyncEngine::new(&mut store, &api).refresh().await.unwrap();
        assert_eq!(freshness, Freshness::Fresh);
        assert_eq!(titles(&store), vec!["One", "Two"]);

        // Persisted
        let reopened = LocalStore::open(tmp.path()).unwrap();
        assert_eq!(reopened.todo_count(), 2);
    }

    #[tokio::test]
    async fn refresh_offline_keeps_cache() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        store.put_todo(todo("a", "Cached", false));
        let api = FakeApi::offline();

        let freshness = SyncEngine::new(&mut store, &api).refresh().await.unwrap();
        assert_eq!(freshness, Freshness::Cached);
        assert_eq!(titles(&store), vec!["Cached"]);
    }

    #[tokio::test]
    async fn forced_offline_never_calls_api() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::online(vec![]);

        let mut engine = SyncEngine::new(&mut store, &api).with_offline(true);
        assert_eq!(engine.refresh().await.unwrap(), Freshness::Cached);
        let (_, delivery) = engine.add("Offline task").await.unwrap();
        assert_eq!(delivery, Delivery::Queued);
        assert!(matches!(
            engine.sync_queued().await,
            Err(SyncError::ForcedOffline)
        ));
        assert!(api.calls().is_empty());
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn add_online_is_synced_and_dequeued() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::online(vec![todo("1", "Existing", false)]);

        let (added, delivery) = SyncEngine::new(&mut store, &api)
            .add("  Buy milk  ")
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Synced);
        assert_eq!(added.title, "Buy milk");
        assert_eq!(store.pending_count(), 0);
        assert_eq!(titles(&store), vec!["Existing", "Buy milk"]);
        assert_eq!(api.calls(), vec![format!("POST {}", added.id), "GET".into()]);
    }

    #[tokio::test]
    async fn add_rejects_blank_title() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::online(vec![]);

        let err = SyncEngine::new(&mut store, &api).add("   ").await.unwrap_err();
        assert!(matches!(err, SyncError::EmptyTitle));
        assert_eq!(store.todo_count(), 0);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn add_offline_is_optimistic_and_queued() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::offline();

        let (added, delivery) = SyncEngine::new(&mut store, &api).add("Later").await.unwrap();
        assert_eq!(delivery, Delivery::Queued);
        assert_eq!(titles(&store), vec!["Later"]);

        let reopened = LocalStore::open(tmp.path()).unwrap();
        let pending = reopened.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].change.id(), added.id);
        assert_eq!(pending[0].change.kind(), "add");
    }

    #[tokio::test]
    async fn offline_changes_replay_in_order_on_reconnect() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::online(vec![todo("1", "One", false), todo("2", "Two", false)]);
        SyncEngine::new(&mut store, &api).refresh().await.unwrap();
        api.set_online(false);

        let mut engine = SyncEngine::new(&mut store, &api);
        let (added, _) = engine.add("Three").await.unwrap();
        engine.toggle("1").await.unwrap();
        engine.delete("2").await.unwrap();
        assert_eq!(engine.store().pending_count(), 3);

        api.set_online(true);
        let report = engine.sync_queued().await.unwrap();
        assert_eq!(
            report.delivered,
            vec![added.id.clone(), "1".to_string(), "2".to_string()]
        );
        assert!(report.is_clean());
        assert_eq!(
            api.calls(),
            vec![
                "GET".to_string(),
                format!("POST {}", added.id),
                "PUT 1".to_string(),
                "DELETE 2".to_string(),
                "GET".to_string(),
            ]
        );

        let server = api.server_todos();
        assert_eq!(server.len(), 2);
        assert!(server[0].is_completed);
        assert_eq!(server[1].title, "Three");
        assert_eq!(store.pending_count(), 0);
        assert_eq!(titles(&store), vec!["One", "Three"]);
    }

    #[tokio::test]
    async fn unreachable_server_stops_drain() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        store.queue_change(PendingChange::Delete { id: "a".into() });
        store.queue_change(PendingChange::Delete { id: "b".into() });
        let api = FakeApi::offline();

        let report = SyncEngine::new(&mut store, &api).sync_queued().await.unwrap();
        assert!(report.unreachable);
        assert_eq!(report.failed, vec!["a".to_string(), "b".to_string()]);
        assert!(report.delivered.is_empty());
        assert_eq!(store.pending_count(), 2);
    }

    #[tokio::test]
    async fn server_error_leaves_change_queued_and_continues() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::online(vec![todo("a", "A", false), todo("b", "B", false)]);
        api.reject("a", 503);
        store.queue_change(PendingChange::Delete { id: "a".into() });
        store.queue_change(PendingChange::Delete { id: "b".into() });

        let report = SyncEngine::new(&mut store, &api).sync_queued().await.unwrap();
        assert_eq!(report.failed, vec!["a".to_string()]);
        assert_eq!(report.delivered, vec!["b".to_string()]);
        assert!(!report.unreachable);
        assert_eq!(store.pending()[0].change.id(), "a");
        // The pending delete still hides the task after refresh
        assert!(store.get("a").is_none());
    }

    #[tokio::test]
    async fn redelivery_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        // Both changes already reached the server before a crash
        let api = FakeApi::online(vec![todo("a", "A", false)]);
        store.queue_change(PendingChange::Add {
            id: "a".into(),
            todo: todo("a", "A", false),
        });
        store.queue_change(PendingChange::Delete { id: "gone".into() });

        let report = SyncEngine::new(&mut store, &api).sync_queued().await.unwrap();
        assert_eq!(report.delivered, vec!["a".to_string(), "gone".to_string()]);
        assert!(report.rejected.is_empty());
        assert_eq!(store.pending_count(), 0);
        assert_eq!(api.server_todos().len(), 1);
    }

    #[tokio::test]
    async fn rejected_change_is_dropped_and_logged() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::online(vec![]);

        let mut engine = SyncEngine::new(&mut store, &api);
        api.set_online(false);
        let (added, _) = engine.add("Bad payload").await.unwrap();
        api.set_online(true);
        api.reject(&added.id, 400);

        let report = engine.sync_queued().await.unwrap();
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].status, Some(400));
        assert_eq!(report.rejected[0].kind, "add");
        assert_eq!(store.pending_count(), 0);
        // Refresh dropped the optimistic copy
        assert_eq!(store.todo_count(), 0);

        let entries = read_recovery_entries(tmp.path(), None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, RecoveryCategory::Rejected);
        assert!(entries[0].body.contains("Bad payload"));
    }

    #[tokio::test]
    async fn direct_rejection_is_reported() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::online(vec![todo("a", "A", false)]);
        SyncEngine::new(&mut store, &api).refresh().await.unwrap();
        api.reject("a", 422);

        let (_, delivery) = SyncEngine::new(&mut store, &api).toggle("a").await.unwrap();
        match delivery {
            Delivery::Rejected(r) => assert_eq!(r.status, Some(422)),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(!store.get("a").unwrap().is_completed);
    }

    #[tokio::test]
    async fn deleting_unsent_task_cancels_both() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::offline();

        let mut engine = SyncEngine::new(&mut store, &api);
        let (added, _) = engine.add("Oops").await.unwrap();
        let delivery = engine.delete(&added.id).await.unwrap();
        assert_eq!(delivery, Delivery::Synced);
        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.todo_count(), 0);
    }

    #[tokio::test]
    async fn toggle_and_delete_unknown_ids() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::online(vec![]);
        let mut engine = SyncEngine::new(&mut store, &api);

        assert!(matches!(
            engine.toggle("nope").await,
            Err(SyncError::NotFound(_))
        ));
        assert!(matches!(
            engine.delete("nope").await,
            Err(SyncError::NotFound(_))
        ));
    }

    fn queue_delete(dir: &Path, id: &str) {
        let mut store = LocalStore::open(dir).unwrap();
        store.queue_change(PendingChange::Delete { id: id.into() });
        store.save().unwrap();
    }

    #[tokio::test]
    async fn tick_reports_transitions_and_drains() {
        let tmp = TempDir::new().unwrap();
        let api = FakeApi::offline();
        {
            let mut store = LocalStore::open(tmp.path()).unwrap();
            SyncEngine::new(&mut store, &api)
                .add("Queued while offline")
                .await
                .unwrap();
        }
        let wait = Duration::from_millis(100);
        let mut last = None;

        let mut events = Vec::new();
        watch_tick(tmp.path(), &api, &mut last, wait, &mut events).await.unwrap();
        assert_eq!(events, vec![WatchEvent::Offline]);

        let mut events = Vec::new();
        watch_tick(tmp.path(), &api, &mut last, wait, &mut events).await.unwrap();
        assert!(events.is_empty());

        api.set_online(true);
        let mut events = Vec::new();
        watch_tick(tmp.path(), &api, &mut last, wait, &mut events).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], WatchEvent::Online);
        match &events[1] {
            WatchEvent::Synced(report) => assert_eq!(report.delivered.len(), 1),
            other => panic!("expected sync, got {other:?}"),
        }
        assert_eq!(LocalStore::open(tmp.path()).unwrap().pending_count(), 0);

        // Online with nothing queued: quiet, and no GET
        let calls_before = api.calls().len();
        let mut events = Vec::new();
        watch_tick(tmp.path(), &api, &mut last, wait, &mut events).await.unwrap();
        assert!(events.is_empty());
        assert_eq!(api.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn tick_keeps_transition_when_lock_is_busy() {
        let tmp = TempDir::new().unwrap();
        queue_delete(tmp.path(), "a");
        let api = FakeApi::online(vec![todo("a", "A", false)]);
        let _held = StoreLock::acquire_default(tmp.path()).unwrap();

        let mut last = None;
        let mut events = Vec::new();
        let err = watch_tick(
            tmp.path(),
            &api,
            &mut last,
            Duration::from_millis(50),
            &mut events,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::Lock(_)));
        assert_eq!(events, vec![WatchEvent::Online]);
        assert_eq!(last, Some(true));
        assert_eq!(api.server_todos().len(), 1);
    }

    #[tokio::test]
    async fn watch_stops_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        queue_delete(tmp.path(), "a");
        let api = FakeApi::online(vec![todo("a", "A", false)]);
        let mut events = Vec::new();

        watch(
            tmp.path(),
            &api,
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_millis(100)),
            |e| events.push(e.clone()),
        )
        .await;

        assert_eq!(events[0], WatchEvent::Online);
        assert!(matches!(events[1], WatchEvent::Synced(_)));
        assert_eq!(LocalStore::open(tmp.path()).unwrap().pending_count(), 0);
        assert!(api.server_todos().is_empty());
    }

    #[tokio::test]
    async fn watch_keeps_going_while_another_process_holds_the_lock() {
        let tmp = TempDir::new().unwrap();
        queue_delete(tmp.path(), "a");
        let api = FakeApi::online(vec![todo("a", "A", false)]);
        let held = StoreLock::acquire_default(tmp.path()).unwrap();
        let mut events = Vec::new();

        let watching = watch(
            tmp.path(),
            &api,
            Duration::from_millis(50),
            tokio::time::sleep(Duration::from_secs(2)),
            |e| events.push(e.clone()),
        );
        let other_writer = async {
            // Several ticks time out on the lock meanwhile
            tokio::time::sleep(Duration::from_millis(400)).await;
            drop(held);
        };
        tokio::join!(watching, other_writer);

        assert_eq!(events[0], WatchEvent::Online);
        assert!(
            events.iter().any(|e| matches!(e, WatchEvent::Synced(r) if r.delivered == ["a"])),
            "{events:?}"
        );
        assert_eq!(LocalStore::open(tmp.path()).unwrap().pending_count(), 0);
        assert!(api.server_todos().is_empty());
    }

    #[tokio::test]
    async fn watch_checks_connectivity_without_holding_the_lock() {
        let tmp = TempDir::new().unwrap();
        queue_delete(tmp.path(), "a");
        let api = FakeApi::online(vec![todo("a", "A", false)]);
        api.set_check_delay(Duration::from_secs(5));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let started = std::time::Instant::now();

        let watching = watch(
            tmp.path(),
            &api,
            Duration::from_millis(10),
            async {
                let _ = stop_rx.await;
            },
            |_| {},
        );
        let cli = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            // A one-shot command gets the lock while the connectivity check hangs
            let got = StoreLock::acquire_async(tmp.path(), Duration::from_millis(200))
                .await
                .is_ok();
            let _ = stop_tx.send(());
            got
        };
        let ((), cli_got_lock) = tokio::join!(watching, cli);

        assert!(cli_got_lock);
        // Shutdown interrupted the hanging connectivity check
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(LocalStore::open(tmp.path()).unwrap().pending_count(), 1);
    }

    #[tokio::test]
    async fn update_of_task_deleted_on_server_counts_as_delivered() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        // Someone else deleted "a" while this client was offline
        let api = FakeApi::online(vec![todo("b", "B", false)]);
        store.queue_change(PendingChange::Update {
            id: "a".into(),
            is_completed: true,
        });
        store.queue_change(PendingChange::Update {
            id: "b".into(),
            is_completed: true,
        });

        let report = SyncEngine::new(&mut store, &api).sync_queued().await.unwrap();
        assert_eq!(report.delivered, vec!["a".to_string(), "b".to_string()]);
        assert!(report.rejected.is_empty());
        assert_eq!(store.pending_count(), 0);
        assert!(read_recovery_entries(tmp.path(), None).is_empty());
        assert_eq!(titles(&store), vec!["B"]);
        assert!(store.get("b").unwrap().is_completed);
    }

    #[tokio::test]
    async fn throttled_changes_stay_queued_and_drain_continues() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path()).unwrap();
        let api = FakeApi::online(vec![
            todo("a", "A", false),
            todo("b", "B", false),
            todo("c", "C", false),
        ]);
        api.reject("a", 429);
        api.reject("b", 408);
        for id in ["a", "b", "c"] {
            store.queue_change(PendingChange::Update {
                id: id.into(),
                is_completed: true,
            });
        }

        let report = SyncEngine::new(&mut store, &api).sync_queued().await.unwrap();
        assert_eq!(report.failed, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(report.delivered, vec!["c".to_string()]);
        assert!(!report.unreachable);
        assert!(report.rejected.is_empty());
        let still_queued: Vec<&str> = store.pending().iter().map(|q| q.change.id()).collect();
        assert_eq!(still_queued, vec!["a", "b"]);
    }

    #[test]
    fn already_applied_statuses() {
        let status = |code| ApiError::Status {
            url: "http://fake/api/Todo".into(),
            status: code,
            body: String::new(),
        };
        let add = PendingChange::Add {
            id: "a".into(),
            todo: todo("a", "A", false),
        };
        let update = PendingChange::Update {
            id: "a".into(),
            is_completed: true,
        };
        let delete = PendingChange::Delete { id: "a".into() };

        assert!(already_applied(&add, &status(409)));
        assert!(already_applied(&update, &status(404)));
        assert!(already_applied(&delete, &status(404)));

        assert!(!already_applied(&add, &status(404)));
        assert!(!already_applied(&update, &status(409)));
        assert!(!already_applied(&delete, &status(409)));
        for code in [408, 429, 503] {
            assert!(!already_applied(&update, &status(code)));
        }
    }

    #[test]
    fn reconcile_overlays_pending_changes() {
        let server = vec![
            todo("1", "One", false),
            todo("2", "Two", false),
            todo("3", "Three", false),
        ];
        let queued = [
            QueuedChange {
                seq: 0,
                queued_at: chrono::Utc::now(),
                change: PendingChange::Update {
                    id: "1".into(),
                    is_completed: true,
                },
            },
            QueuedChange {
                seq: 1,
                queued_at: chrono::Utc::now(),
                change: PendingChange::Delete { id: "2".into() },
            },
            QueuedChange {
                seq: 2,
                queued_at: chrono::Utc::now(),
                change: PendingChange::Add {
                    id: "4".into(),
                    todo: todo("4", "Four", false),
                },
            },
            QueuedChange {
                seq: 3,
                queued_at: chrono::Utc::now(),
                change: PendingChange::Update {
                    id: "missing".into(),
                    is_completed: true,
                },
            },
        ];
        let pending: Vec<&QueuedChange> = queued.iter().collect();

        let merged = reconcile(server, &pending);
        let summary: Vec<_> = merged
            .iter()
            .map(|t| (t.id.as_str(), t.is_completed))
            .collect();
        assert_eq!(summary, vec![("1", true), ("3", false), ("4", false)]);
    }
}
