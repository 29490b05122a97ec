use regex::Regex;

use crate::io::store::LocalStore;
use crate::model::Todo;
use crate::ops::sync::SyncError;

/// Resolve a user-supplied id or unique id prefix to a full task id.
///
/// An exact match always wins, even if it is also a prefix of another id.
pub fn resolve_id(store: &LocalStore, prefix: &str) -> Result<String, SyncError> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(SyncError::NotFound(prefix.to_string()));
    }
    if store.get(prefix).is_some() {
        return Ok(prefix.to_string());
    }

    let matches: Vec<&Todo> = store
        .todos()
        .filter(|t| t.id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => Err(SyncError::NotFound(prefix.to_string())),
        many => Err(SyncError::Ambiguous {
            prefix: prefix.to_string(),
            count: many.len(),
        }),
    }
}

/// Filters for `todo list`
#[derive(Debug, Default)]
pub struct ListFilter {
    /// Only tasks with a queued change
    pub pending_only: bool,
    /// Some(true) = only completed, Some(false) = only open
    pub completed: Option<bool>,
    /// Case-insensitive title match
    pub title: Option<Regex>,
}

impl ListFilter {
    /// Compile a title pattern; an invalid regex is matched literally.
    pub fn title_pattern(pattern: &str) -> Result<Regex, regex::Error> {
        Regex::new(&format!("(?i){}", pattern))
            .or_else(|_| Regex::new(&format!("(?i){}", regex::escape(pattern))))
    }

    pub fn matches(&self, store: &LocalStore, todo: &Todo) -> bool {
        if self.pending_only && store.pending_for(&todo.id).is_none() {
            return false;
        }
        if let Some(done) = self.completed
            && todo.is_completed != done
        {
            return false;
        }
        if let Some(re) = &self.title
            && !re.is_match(&todo.title)
        {
            return false;
        }
        true
    }
}

/// Tasks passing `filter`, in mirror order
pub fn filter_todos<'a>(store: &'a LocalStore, filter: &ListFilter) -> Vec<&'a Todo> {
    store.todos().filter(|t| filter.matches(store, t)).collect()
}

/// Open/completed counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoStats {
    pub open: usize,
    pub completed: usize,
    pub pending_changes: usize,
}

pub fn stats(store: &LocalStore) -> TodoStats {
    let completed = store.todos().filter(|t| t.is_completed).count();
    TodoStats {
        open: store.todo_count() - completed,
        completed,
        pending_changes: store.pending_count(),
    }
}
