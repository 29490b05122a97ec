use serde::{Deserialize, Serialize};

/// A task as stored locally and exchanged with the API.
///
/// Field names on the wire are camelCase (`isCompleted`). Unknown fields sent
/// by the server are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_completed: bool,
}

impl Todo {
    /// Create a new, not yet completed task with a fresh client-side id
    pub fn new(title: impl Into<String>) -> Self {
        Todo {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: String::new(),
            is_completed: false,
        }
    }

    /// First 8 characters of the id, for display
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Shorten an id for display. Ids shorter than 8 characters are returned as-is.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
