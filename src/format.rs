//! Output formatting for the CLI: plain text or JSON.

use crate::client::{CachedPage, Pagination};
use crate::types::{Task, TaskStatus, User};
use serde_json::{Value, json};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn checkbox(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "[ ]",
        TaskStatus::Done => "[x]",
    }
}

/// One line per task: `[x] #12  Buy milk  (2024-01-01 09:30)`.
pub fn format_task_line(task: &Task) -> String {
    format!(
        "{} #{:<5} {}  ({})",
        checkbox(task.status),
        task.id,
        task.title,
        task.created_at.format("%Y-%m-%d %H:%M")
    )
}

fn format_pagination(p: &Pagination) -> String {
    let noun = if p.total == 1 { "task" } else { "tasks" };
    format!("Page {} of {} ({} {})", p.page, p.total_pages, p.total, noun)
}

/// Format a listing page as text.
pub fn format_page_text(page: &CachedPage) -> String {
    let mut out = String::new();
    if page.tasks.is_empty() {
        out.push_str("No tasks found.\n");
    }
    for task in &page.tasks {
        out.push_str(&format_task_line(task));
        out.push('\n');
    }
    out.push_str(&format_pagination(&page.pagination()));
    out.push('\n');
    out
}

pub fn page_to_json(page: &CachedPage) -> Value {
    let p = page.pagination();
    json!({
        "tasks": page.tasks,
        "total": p.total,
        "page": p.page,
        "totalPages": p.total_pages,
    })
}

pub fn format_page(page: &CachedPage, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_page_text(page),
        OutputFormat::Json => pretty(&page_to_json(page)),
    }
}

pub fn format_task(task: &Task, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_task_line(task),
        OutputFormat::Json => pretty(&json!(task)),
    }
}

pub fn format_user(user: &User, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("{} <{}> (id {})", user.name, user.email, user.id),
        OutputFormat::Json => pretty(&json!(user)),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
