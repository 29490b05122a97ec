//! Local persistent store: the task mirror and the pending-changes queue.
//!
//! Both live in one JSON document, `todo-db.json`, inside the data directory:
//!
//! ```json
//! { "version": 1, "todos": [...], "syncQueue": [...], "nextSeq": 3 }
//! ```
//!
//! The queue is keyed by task id (one entry per task) and replayed in `seq`
//! order. Writes go through [`atomic_write`] so a crash never leaves a
//! half-written document behind.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::io::lock::LockError;
use crate::io::recovery::{RecoveryCategory, RecoveryEntry, atomic_write, log_recovery};
use crate::model::{Coalesced, PendingChange, QueuedChange, Todo, coalesce};

pub const STORE_FILE: &str = "todo-db.json";

/// The only schema version this build reads or writes
pub const STORE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} has store version {found}, this build only understands version {expected}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u64,
        expected: u32,
    },
    #[error("could not serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// On-disk shape of `todo-db.json`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    todos: Vec<Todo>,
    #[serde(default)]
    sync_queue: Vec<QueuedChange>,
    #[serde(default)]
    next_seq: u64,
}

/// In-memory view of the store. Call [`LocalStore::save`] to persist.
#[derive(Debug, Clone)]
pub struct LocalStore {
    data_dir: PathBuf,
    todos: IndexMap<String, Todo>,
    queue: IndexMap<String, QueuedChange>,
    next_seq: u64,
}

impl LocalStore {
    /// Open the store in `data_dir`, creating the directory if needed.
    ///
    /// A missing file yields an empty store. An unparseable file is backed up
    /// as `todo-db.json.bak`, noted in the recovery log, and overwritten with
    /// an empty store. If the backup cannot be written the file is left alone
    /// and opening fails.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir).map_err(|source| StoreError::Write {
            path: data_dir.to_path_buf(),
            source,
        })?;

        let mut store = LocalStore {
            data_dir: data_dir.to_path_buf(),
            todos: IndexMap::new(),
            queue: IndexMap::new(),
            next_seq: 0,
        };

        let path = store.path();
        if !path.exists() {
            return Ok(store);
        }
        let content = fs::read_to_string(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;

        match parse_document(&path, &content)? {
            Some(doc) => {
                store.todos = doc.todos.into_iter().map(|t| (t.id.clone(), t)).collect();
                store.queue = doc
                    .sync_queue
                    .into_iter()
                    .map(|q| (q.change.id().to_string(), q))
                    .collect();
                let max_seq = store.queue.values().map(|q| q.seq + 1).max().unwrap_or(0);
                store.next_seq = doc.next_seq.max(max_seq);
            }
            None => store.reset_corrupt(&content)?,
        }
        Ok(store)
    }

    fn reset_corrupt(&self, content: &str) -> Result<(), StoreError> {
        let path = self.path();
        let backup = path.with_extension("json.bak");
        if let Err(source) = fs::copy(&path, &backup) {
            tracing::error!(
                path = %path.display(),
                backup = %backup.display(),
                error = %source,
                "local store is unreadable and could not be backed up"
            );
            return Err(StoreError::Write {
                path: backup,
                source,
            });
        }
        tracing::warn!(
            path = %path.display(),
            backup = %backup.display(),
            "local store is unreadable; starting empty"
        );
        log_recovery(
            &self.data_dir,
            RecoveryEntry::new(RecoveryCategory::Corrupt, "store unreadable, reset to empty")
                .field("Backup", backup.display().to_string())
                .body(content),
        );
        // Persist the reset so later reads don't repeat it
        self.save()
    }

    /// Number of queued changes on disk, read without repairing anything.
    ///
    /// Safe without the lock since writes are atomic renames. A missing or
    /// unreadable file counts as empty; the next locked open deals with it.
    pub fn queued_count(data_dir: &Path) -> Result<usize, StoreError> {
        let path = data_dir.join(STORE_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        Ok(parse_document(&path, &content)?.map_or(0, |doc| doc.sync_queue.len()))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }

    /// Persist the store atomically.
    pub fn save(&self) -> Result<(), StoreError> {
        let doc = StoreDocument {
            version: STORE_VERSION,
            todos: self.todos.values().cloned().collect(),
            sync_queue: self.pending().into_iter().cloned().collect(),
            next_seq: self.next_seq,
        };
        let content = serde_json::to_string_pretty(&doc)?;
        let path = self.path();
        if let Err(source) = atomic_write(&path, content.as_bytes()) {
            log_recovery(
                &self.data_dir,
                RecoveryEntry::new(RecoveryCategory::Write, "store write failed")
                    .field("Target", path.display().to_string())
                    .field("Error", source.to_string())
                    .body(content),
            );
            return Err(StoreError::Write { path, source });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mirror
    // -----------------------------------------------------------------------

    /// Mirrored tasks in insertion order
    pub fn todos(&self) -> impl Iterator<Item = &Todo> {
        self.todos.values()
    }

    pub fn todo_count(&self) -> usize {
        self.todos.len()
    }

    pub fn get(&self, id: &str) -> Option<&Todo> {
        self.todos.get(id)
    }

    /// Insert a task, or replace the one with the same id in place.
    pub fn put_todo(&mut self, todo: Todo) {
        self.todos.insert(todo.id.clone(), todo);
    }

    pub fn delete_todo(&mut self, id: &str) -> Option<Todo> {
        self.todos.shift_remove(id)
    }

    /// Reset the mirror to exactly `todos`.
    pub fn replace_all(&mut self, todos: Vec<Todo>) {
        self.todos = todos.into_iter().map(|t| (t.id.clone(), t)).collect();
    }

    // -----------------------------------------------------------------------
    // Pending-changes queue
    // -----------------------------------------------------------------------

    /// Queue a change, folding it into any change already queued for the
    /// same task.
    pub fn queue_change(&mut self, change: PendingChange) {
        let id = change.id().to_string();

        let Some(existing) = self.queue.get_mut(&id) else {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.queue.insert(
                id,
                QueuedChange {
                    seq,
                    queued_at: Utc::now(),
                    change,
                },
            );
            return;
        };

        match coalesce(&existing.change, change) {
            Coalesced::Replace(merged) => {
                existing.change = merged;
                existing.queued_at = Utc::now();
            }
            Coalesced::Cancel => {
                self.queue.shift_remove(&id);
            }
            Coalesced::KeepExisting => {}
        }
    }

    /// Queued changes in replay (FIFO) order
    pub fn pending(&self) -> Vec<&QueuedChange> {
        let mut pending: Vec<&QueuedChange> = self.queue.values().collect();
        pending.sort_by_key(|q| q.seq);
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_for(&self, id: &str) -> Option<&QueuedChange> {
        self.queue.get(id)
    }

    /// Remove the queued change for a task (after delivery).
    pub fn clear_change(&mut self, id: &str) -> Option<QueuedChange> {
        self.queue.shift_remove(id)
    }
}

/// Parse the document. `Ok(None)` means the content is unreadable and the
/// caller should reset; a readable document with a foreign version is an error.
fn parse_document(path: &Path, content: &str) -> Result<Option<StoreDocument>, StoreError> {
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    if let Some(found) = value.get("version").and_then(|v| v.as_u64())
        && found != u64::from(STORE_VERSION)
    {
        return Err(StoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            found,
            expected: STORE_VERSION,
        });
    }

    Ok(serde_json::from_value(value).ok())
}
