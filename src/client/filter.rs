//! Filter selection, cache-key derivation, and client-side matching.

use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_LIMIT, Task, TaskStatus, search_key};

/// The page/limit/status/search selection that decides which tasks are shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub page: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            status: None,
            search: None,
        }
    }
}

impl TaskFilter {
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Trimmed search term, or `None` when absent or blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Cache key for this filter.
    pub fn key(&self) -> FilterKey {
        FilterKey::from(self)
    }

    /// Whether a task belongs in the listing this filter selects.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        match self.search_term() {
            Some(term) => search_key(&task.title).contains(&search_key(term)),
            None => true,
        }
    }

    /// Merge a partial update into a copy of this filter.
    ///
    /// Changing status, search, or limit without naming a page returns to page 1.
    pub fn merged(&self, update: &FilterUpdate) -> TaskFilter {
        let mut next = self.clone();
        if let Some(limit) = update.limit {
            next.limit = limit.max(1);
        }
        if let Some(ref status) = update.status {
            next.status = *status;
        }
        if let Some(ref search) = update.search {
            next.search = search.clone().filter(|s| !s.trim().is_empty());
        }

        let narrowed = next.limit != self.limit
            || next.status != self.status
            || next.search_term() != self.search_term();
        next.page = match update.page {
            Some(page) => page.max(1),
            None if narrowed => 1,
            None => self.page,
        };
        next
    }
}

/// Partial filter change emitted by a view.
///
/// `status` and `search` use a nested `Option` so a view can clear them:
/// `Some(None)` removes the constraint, `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterUpdate {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<Option<TaskStatus>>,
    pub search: Option<Option<String>>,
}

impl FilterUpdate {
    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            ..Self::default()
        }
    }

    pub fn status(status: Option<TaskStatus>) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn search(search: Option<String>) -> Self {
        Self {
            search: Some(search),
            ..Self::default()
        }
    }
}

/// Deterministic cache key: `(page, limit, status or "all", trimmed search or "")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterKey {
    pub page: u32,
    pub limit: u32,
    pub status: String,
    pub search: String,
}

impl From<&TaskFilter> for FilterKey {
    fn from(filter: &TaskFilter) -> Self {
        Self {
            page: filter.page,
            limit: filter.limit,
            status: filter
                .status
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "all".to_string()),
            search: filter.search_term().unwrap_or_default().to_string(),
        }
    }
}

impl std::fmt::Display for FilterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "page={} limit={} status={} search={:?}",
            self.page, self.limit, self.status, self.search
        )
    }
}
