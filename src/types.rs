//! Core types shared by the API server and the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a task title, in characters.
pub const MAX_TITLE_LEN: usize = 255;

/// Default page size for task listings.
pub const DEFAULT_LIMIT: u32 = 10;

/// Upper bound the server accepts for a page size.
pub const MAX_LIMIT: u32 = 100;

/// Page sizes offered to users.
pub const LIMIT_CHOICES: [u32; 3] = [10, 20, 50];

/// Case-folded form of a title or search term.
///
/// The server stores it alongside each title and the client filter compares
/// with it, so both sides agree on non-ASCII text.
pub fn search_key(text: &str) -> String {
    text.to_lowercase()
}

/// Task completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
        }
    }

    /// The other status: pending becomes done and vice versa.
    pub fn toggled(self) -> Self {
        match self {
            TaskStatus::Pending => TaskStatus::Done,
            TaskStatus::Done => TaskStatus::Pending,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!("Invalid status '{}': expected pending or done", other)),
        }
    }
}

/// A task owned by a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server ids are positive. Optimistic placeholders carry a negative id.
    pub id: i64,
    pub title: String,
    pub status: TaskStatus,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Whether this is a client-side placeholder not yet confirmed by the server.
    pub fn is_placeholder(&self) -> bool {
        self.id < 0
    }
}

/// Partial update of a task. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    /// A patch that only sets the status.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            title: None,
            status: Some(status),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.status.is_none()
    }

    /// Apply this patch to a task, returning the merged copy.
    pub fn apply_to(&self, task: &Task, now: DateTime<Utc>) -> Task {
        let mut merged = task.clone();
        if let Some(ref title) = self.title {
            merged.title = title.trim().to_string();
        }
        if let Some(status) = self.status {
            merged.status = status;
        }
        merged.updated_at = now;
        merged
    }
}

/// One page of a filtered task listing, as returned by `GET /tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksPage {
    pub tasks: Vec<Task>,
    pub total: i64,
    pub page: u32,
    pub total_pages: u32,
}

/// Number of pages needed for `total` items, never less than one.
pub fn total_pages(total: i64, limit: u32) -> u32 {
    if total <= 0 || limit == 0 {
        return 1;
    }
    let limit = limit as i64;
    (((total + limit - 1) / limit) as u32).max(1)
}

/// A registered user. The password hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validate a task title, returning the trimmed value.
pub fn validate_title(title: &str) -> Result<String, String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("Title is required".to_string());
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(format!("Title must be at most {} characters", MAX_TITLE_LEN));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Done".parse::<TaskStatus>().unwrap(), TaskStatus::Done);
        assert_eq!(" pending ".parse::<TaskStatus>().unwrap(), TaskStatus::Pending);
        assert!("archived".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn toggled_flips_status() {
        assert_eq!(TaskStatus::Pending.toggled(), TaskStatus::Done);
        assert_eq!(TaskStatus::Done.toggled().toggled(), TaskStatus::Done);
    }

    #[test]
    fn total_pages_is_clamped_to_one() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(101, 50), 3);
    }

    #[test]
    fn validate_title_rejects_blank_and_long() {
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(256)).is_err());
        assert_eq!(validate_title("  Buy milk ").unwrap(), "Buy milk");
    }

    #[test]
    fn task_serializes_camel_case() {
        let now = Utc::now();
        let task = Task {
            id: 1,
            title: "t".into(),
            status: TaskStatus::Done,
            user_id: 7,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["userId"], 7);
        assert_eq!(json["status"], "done");
        assert!(json.get("createdAt").is_some());
    }
}
