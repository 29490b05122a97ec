use serde::Serialize;

use crate::io::store::LocalStore;
use crate::model::{PendingChange, QueuedChange, Todo};
use crate::ops::sync::{Delivery, Freshness, Rejection, SyncReport};
use crate::ops::todo_ops::TodoStats;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoJson<'a> {
    pub id: &'a str,
    pub title: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'a str,
    pub is_completed: bool,
    /// Kind of the queued change, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<&'static str>,
}

#[derive(Serialize)]
pub struct ListJson<'a> {
    pub source: Freshness,
    pub todos: Vec<TodoJson<'a>>,
}

#[derive(Serialize)]
pub struct ChangeResultJson<'a> {
    pub id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub todo: Option<TodoJson<'a>>,
    pub delivery: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<&'a Rejection>,
}

impl<'a> ChangeResultJson<'a> {
    pub fn new(id: &'a str, todo: Option<TodoJson<'a>>, delivery: &'a Delivery) -> Self {
        let (name, rejection) = match delivery {
            Delivery::Synced => ("synced", None),
            Delivery::Queued => ("queued", None),
            Delivery::Rejected(r) => ("rejected", Some(r)),
        };
        ChangeResultJson {
            id,
            todo,
            delivery: name,
            rejection,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusJson<'a> {
    pub online: bool,
    pub forced_offline: bool,
    pub api: &'a str,
    pub data_dir: String,
    #[serde(flatten)]
    pub stats: TodoStats,
}

pub fn todo_to_json<'a>(store: &LocalStore, todo: &'a Todo) -> TodoJson<'a> {
    TodoJson {
        id: &todo.id,
        title: &todo.title,
        description: &todo.description,
        is_completed: todo.is_completed,
        pending: store.pending_for(&todo.id).map(|q| q.change.kind()),
    }
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

fn check_box(done: bool) -> &'static str {
    if done { "[x]" } else { "[ ]" }
}

/// `[x] 1a2b3c4d  Title *` with `*` marking a change waiting to sync
pub fn format_todo_line(todo: &Todo, pending: bool) -> String {
    let mut line = format!("{} {}  {}", check_box(todo.is_completed), todo.short_id(), todo.title);
    if pending {
        line.push_str(" *");
    }
    line
}

pub fn format_todo_detail(todo: &Todo, pending: Option<&QueuedChange>) -> Vec<String> {
    let mut lines = vec![
        format!("{} {}", check_box(todo.is_completed), todo.title),
        format!("id: {}", todo.id),
    ];
    if !todo.description.is_empty() {
        lines.push(format!("description: {}", todo.description));
    }
    match pending {
        Some(q) => lines.push(format!(
            "pending: {} (queued {})",
            describe_change(&q.change),
            q.queued_at.format("%Y-%m-%d %H:%M:%S UTC")
        )),
        None => lines.push("pending: none".to_string()),
    }
    lines
}

pub fn describe_change(change: &PendingChange) -> String {
    match change {
        PendingChange::Add { todo, .. } => format!("add \"{}\"", todo.title),
        PendingChange::Delete { .. } => "delete".to_string(),
        PendingChange::Update { is_completed, .. } => {
            format!("mark {}", if *is_completed { "done" } else { "not done" })
        }
    }
}

/// One queue row: position, kind, short id, details
pub fn format_queue_line(position: usize, queued: &QueuedChange) -> String {
    format!(
        "{:>3}. {:<6} {}  {}",
        position,
        queued.change.kind(),
        crate::model::short_id(queued.change.id()),
        describe_change(&queued.change)
    )
}

/// Suffix for a just-made change: empty when delivered
pub fn delivery_note(delivery: &Delivery) -> String {
    match delivery {
        Delivery::Synced => String::new(),
        Delivery::Queued => " (queued)".to_string(),
        Delivery::Rejected(r) => format!(" (rejected by server: {})", r.message),
    }
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!("{} change(s) delivered", report.delivered.len())];
    if !report.failed.is_empty() {
        let reason = if report.unreachable {
            "server unreachable"
        } else {
            "server error"
        };
        lines.push(format!("{} change(s) still queued ({})", report.failed.len(), reason));
    }
    for r in &report.rejected {
        lines.push(format!(
            "rejected: {} {} ({}); see `todo recovery`",
            r.kind,
            crate::model::short_id(&r.id),
            r.message
        ));
    }
    lines
}

pub fn format_status(status: &StatusJson) -> Vec<String> {
    let connection = if status.forced_offline {
        "offline (forced)"
    } else if status.online {
        "online"
    } else {
        "offline"
    };
    vec![
        format!("server:   {} ({})", status.api, connection),
        format!("data:     {}", status.data_dir),
        format!(
            "tasks:    {} open, {} done",
            status.stats.open, status.stats.completed
        ),
        format!("pending:  {}", status.stats.pending_changes),
    ]
}
