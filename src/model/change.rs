use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::todo::Todo;

/// A mutation waiting to be delivered to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PendingChange {
    /// Create `todo` on the server
    Add { id: String, todo: Todo },
    /// Delete the task
    Delete { id: String },
    /// Set the completion flag
    Update {
        id: String,
        #[serde(rename = "isCompleted")]
        is_completed: bool,
    },
}

impl PendingChange {
    /// The task id this change applies to (the queue key)
    pub fn id(&self) -> &str {
        match self {
            PendingChange::Add { id, .. }
            | PendingChange::Delete { id }
            | PendingChange::Update { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingChange::Add { .. } => "add",
            PendingChange::Delete { .. } => "delete",
            PendingChange::Update { .. } => "update",
        }
    }
}

/// A queued change with its replay position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedChange {
    /// Monotonic enqueue order; replay is ascending
    pub seq: u64,
    pub queued_at: DateTime<Utc>,
    pub change: PendingChange,
}

/// Result of folding a new change into the one already queued for the same task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coalesced {
    /// Replace the queued change, keeping its position
    Replace(PendingChange),
    /// Remove the queued change and don't enqueue the new one
    Cancel,
    /// Keep the queued change untouched
    KeepExisting,
}

/// Fold `incoming` into `existing` (both for the same task id).
pub fn coalesce(existing: &PendingChange, incoming: PendingChange) -> Coalesced {
    use PendingChange::*;

    match (existing, incoming) {
        // A deleted task can't be revived or edited
        (Delete { .. }, _) => Coalesced::KeepExisting,
        // Never reached the server, so nothing to delete there
        (Add { .. }, Delete { .. }) => Coalesced::Cancel,
        (Add { id, todo }, Update { is_completed, .. }) => {
            let mut todo = todo.clone();
            todo.is_completed = is_completed;
            Coalesced::Replace(Add {
                id: id.clone(),
                todo,
            })
        }
        (Add { .. }, add @ Add { .. }) => Coalesced::Replace(add),
        (Update { .. }, incoming) => Coalesced::Replace(incoming),
    }
}
