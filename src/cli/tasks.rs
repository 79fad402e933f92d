//! Task subcommand arguments.

use clap::Args;

use crate::client::TaskFilter;
use crate::types::{TaskPatch, TaskStatus};

/// Arguments for the list subcommand
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Tasks per page (default from config)
    #[arg(long)]
    pub limit: Option<u32>,

    /// Only tasks with this status: pending or done
    #[arg(long)]
    pub status: Option<TaskStatus>,

    /// Case-insensitive substring of the title
    #[arg(long)]
    pub search: Option<String>,
}

impl ListArgs {
    pub fn to_filter(&self, default_limit: u32) -> TaskFilter {
        TaskFilter {
            page: self.page.max(1),
            limit: self.limit.unwrap_or(default_limit).max(1),
            status: self.status,
            search: self.search.clone(),
        }
    }
}

/// Arguments for the edit subcommand
#[derive(Args, Debug)]
pub struct EditArgs {
    /// Task id
    pub id: i64,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New status: pending or done
    #[arg(long)]
    pub status: Option<TaskStatus>,
}

impl EditArgs {
    pub fn to_patch(&self) -> TaskPatch {
        TaskPatch {
            title: self.title.clone(),
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_uses_default_limit() {
        let args = ListArgs {
            page: 0,
            limit: None,
            status: None,
            search: Some("milk".into()),
        };
        let filter = args.to_filter(20);
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, 20);
        assert_eq!(filter.search_term(), Some("milk"));
    }

    #[test]
    fn edit_without_fields_is_empty_patch() {
        let args = EditArgs {
            id: 3,
            title: None,
            status: None,
        };
        assert!(args.to_patch().is_empty());
    }
}
