//! Keyed cache of task listings, one entry per distinct filter.
//!
//! The cache is the single source of truth for what a view renders. Entries are
//! replaced by fetches and reconciled mutations, patched in place by optimistic
//! edits, and only marked stale (never dropped) by invalidation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::SyncResult;
use super::filter::{FilterKey, TaskFilter};
use super::remote::RemoteTaskService;
use crate::types::{Task, TasksPage, total_pages};

/// Namespace holding every task listing.
pub const TASKS_NAMESPACE: &str = "tasks";

/// Cache key: a namespace plus the filter key within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub namespace: &'static str,
    pub filter: FilterKey,
}

impl QueryKey {
    /// Key of the task listing for a filter.
    pub fn tasks(filter: &TaskFilter) -> Self {
        Self {
            namespace: TASKS_NAMESPACE,
            filter: filter.key(),
        }
    }
}

/// Pagination summary shown alongside a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub total_pages: u32,
}

/// Stored result of one filter's most recent fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    /// Most recent first, as ordered by the server.
    pub tasks: Vec<Task>,
    pub total: i64,
    pub page: u32,
    pub total_pages: u32,
}

impl CachedPage {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            total: self.total,
            page: self.page,
            total_pages: self.total_pages,
        }
    }

    /// Shift `total` by `delta` (never below zero) and recompute `total_pages`.
    pub fn adjust_total(&mut self, delta: i64, limit: u32) {
        self.total = (self.total + delta).max(0);
        self.total_pages = total_pages(self.total, limit);
    }

    pub fn position(&self, task_id: i64) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }
}

impl From<TasksPage> for CachedPage {
    fn from(response: TasksPage) -> Self {
        Self {
            tasks: response.tasks,
            total: response.total.max(0),
            page: response.page.max(1),
            total_pages: response.total_pages.max(1),
        }
    }
}

/// Value copy of an entry, taken before an optimistic edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    key: QueryKey,
    page: CachedPage,
}

impl Snapshot {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn page(&self) -> &CachedPage {
        &self.page
    }
}

#[derive(Debug)]
struct Entry {
    page: CachedPage,
    stale: bool,
    /// Generation of the fetch that produced the stored response.
    generation: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<QueryKey, Entry>,
    /// Last generation handed out, shared by every key.
    issued: u64,
    /// Value of `issued` at the last `clear`. Older fetches must not repopulate.
    cleared_at: u64,
}

/// Shared query cache. Every method is a single atomic step under one lock.
#[derive(Debug, Default)]
pub struct QueryCache {
    state: Mutex<CacheState>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current entry for a key, stale or not.
    pub fn get(&self, key: &QueryKey) -> Option<CachedPage> {
        self.lock().entries.get(key).map(|e| e.page.clone())
    }

    /// Current entry for a key only if it has not been invalidated.
    pub fn get_fresh(&self, key: &QueryKey) -> Option<CachedPage> {
        self.lock()
            .entries
            .get(key)
            .filter(|e| !e.stale)
            .map(|e| e.page.clone())
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.lock().entries.get(key).is_some_and(|e| e.stale)
    }

    /// Store a page directly, marking it fresh.
    pub fn set(&self, key: QueryKey, page: CachedPage) {
        let mut state = self.lock();
        let generation = state.issued;
        state.entries.insert(
            key,
            Entry {
                page,
                stale: false,
                generation,
            },
        );
    }

    /// Mark every entry in `namespace` stale. Returns how many were marked.
    pub fn invalidate_all(&self, namespace: &str) -> usize {
        let mut state = self.lock();
        let mut marked = 0;
        for (key, entry) in state.entries.iter_mut() {
            if key.namespace == namespace {
                entry.stale = true;
                marked += 1;
            }
        }
        marked
    }

    /// Drop every entry, e.g. when the session owner changes.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.cleared_at = state.issued;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve a generation number for a fetch about to start. Generations
    /// increase across every key and survive [`clear`](Self::clear).
    pub fn begin_fetch(&self) -> u64 {
        let mut state = self.lock();
        state.issued += 1;
        state.issued
    }

    /// Store a fetched page unless a newer fetch already stored its response,
    /// or the fetch started before the last [`clear`](Self::clear).
    ///
    /// Returns whether the page was stored.
    pub fn complete_fetch(&self, key: QueryKey, generation: u64, page: CachedPage) -> bool {
        let mut state = self.lock();
        if generation <= state.cleared_at {
            return false;
        }
        if let Some(existing) = state.entries.get(&key) {
            if existing.generation > generation {
                return false;
            }
        }
        state.entries.insert(
            key,
            Entry {
                page,
                stale: false,
                generation,
            },
        );
        true
    }

    /// Copy of the entry for `key`, if any.
    pub fn snapshot(&self, key: &QueryKey) -> Option<Snapshot> {
        self.lock().entries.get(key).map(|e| Snapshot {
            key: key.clone(),
            page: e.page.clone(),
        })
    }

    /// Edit an entry in place. Returns false when there is no entry.
    pub fn patch<F>(&self, key: &QueryKey, f: F) -> bool
    where
        F: FnOnce(&mut CachedPage),
    {
        match self.lock().entries.get_mut(key) {
            Some(entry) => {
                f(&mut entry.page);
                true
            }
            None => false,
        }
    }

    /// Put a snapshot's page back. An entry cleared in the meantime stays cleared.
    pub fn restore(&self, snapshot: Snapshot) -> bool {
        let Snapshot { key, page } = snapshot;
        match self.lock().entries.get_mut(&key) {
            Some(entry) => {
                entry.page = page;
                true
            }
            None => false,
        }
    }

    /// Serve the listing for `filter`, reading through to the remote service
    /// when the entry is missing, stale, or `force` is set.
    pub async fn fetch(
        &self,
        remote: &dyn RemoteTaskService,
        filter: &TaskFilter,
        force: bool,
    ) -> SyncResult<CachedPage> {
        let key = QueryKey::tasks(filter);
        if !force {
            if let Some(page) = self.get_fresh(&key) {
                debug!(key = %key.filter, "Cache hit");
                return Ok(page);
            }
        }

        let generation = self.begin_fetch();
        debug!(key = %key.filter, generation, "Fetching tasks");
        let page = CachedPage::from(remote.list_tasks(filter).await?);

        if self.complete_fetch(key.clone(), generation, page.clone()) {
            Ok(page)
        } else {
            debug!(key = %key.filter, generation, "Discarded superseded response");
            Ok(self.get(&key).unwrap_or(page))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;
    use chrono::Utc;

    fn page_with(ids: &[i64]) -> CachedPage {
        let now = Utc::now();
        CachedPage {
            tasks: ids
                .iter()
                .map(|&id| Task {
                    id,
                    title: format!("task {}", id),
                    status: TaskStatus::Pending,
                    user_id: 1,
                    created_at: now,
                    updated_at: now,
                })
                .collect(),
            total: ids.len() as i64,
            page: 1,
            total_pages: 1,
        }
    }

    #[test]
    fn invalidate_marks_only_namespace_entries() {
        let cache = QueryCache::new();
        let key = QueryKey::tasks(&TaskFilter::default());
        let other = QueryKey {
            namespace: "users",
            filter: key.filter.clone(),
        };
        cache.set(key.clone(), page_with(&[1]));
        cache.set(other.clone(), page_with(&[2]));

        assert_eq!(cache.invalidate_all(TASKS_NAMESPACE), 1);
        assert!(cache.is_stale(&key));
        assert!(!cache.is_stale(&other));
        assert!(cache.get_fresh(&key).is_none());
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn older_generation_cannot_overwrite_newer() {
        let cache = QueryCache::new();
        let key = QueryKey::tasks(&TaskFilter::default());

        let first = cache.begin_fetch();
        let second = cache.begin_fetch();
        assert!(second > first);

        assert!(cache.complete_fetch(key.clone(), second, page_with(&[2])));
        assert!(!cache.complete_fetch(key.clone(), first, page_with(&[1])));
        assert_eq!(cache.get(&key).unwrap().tasks[0].id, 2);
    }

    #[test]
    fn restore_returns_exact_snapshot() {
        let cache = QueryCache::new();
        let key = QueryKey::tasks(&TaskFilter::default());
        cache.set(key.clone(), page_with(&[3, 2, 1]));

        let snapshot = cache.snapshot(&key).unwrap();
        cache.patch(&key, |page| {
            page.tasks.remove(0);
            page.adjust_total(-1, 10);
        });
        assert_eq!(cache.get(&key).unwrap().total, 2);

        assert!(cache.restore(snapshot.clone()));
        assert_eq!(&cache.get(&key).unwrap(), snapshot.page());
    }

    #[test]
    fn restore_after_clear_is_a_no_op() {
        let cache = QueryCache::new();
        let key = QueryKey::tasks(&TaskFilter::default());
        cache.set(key.clone(), page_with(&[1]));
        let snapshot = cache.snapshot(&key).unwrap();
        cache.clear();
        assert!(!cache.restore(snapshot));
        assert!(cache.is_empty());
    }

    #[test]
    fn fetch_started_before_clear_is_not_stored() {
        let cache = QueryCache::new();
        let key = QueryKey::tasks(&TaskFilter::default());

        let before_logout = cache.begin_fetch();
        cache.clear();
        assert!(!cache.complete_fetch(key.clone(), before_logout, page_with(&[7])));
        assert!(cache.get(&key).is_none());

        let after_login = cache.begin_fetch();
        assert!(after_login > before_logout);
        assert!(cache.complete_fetch(key.clone(), after_login, page_with(&[8])));
        assert_eq!(cache.get(&key).unwrap().tasks[0].id, 8);
    }

    #[test]
    fn adjust_total_clamps_pages() {
        let mut page = page_with(&[]);
        page.adjust_total(-1, 10);
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 1);
        page.adjust_total(21, 10);
        assert_eq!(page.total_pages, 3);
    }
}
