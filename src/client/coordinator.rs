//! Optimistic task mutations.
//!
//! Every mutation runs in three phases against the cache entry of the filter
//! that was active when it started:
//!
//! 1. **Optimistic**: snapshot the entry and patch it as if the server had
//!    already accepted the change.
//! 2. **Network**: send the request.
//! 3. **Settle**: reconcile the server's record into the entry, or restore the
//!    snapshot on failure. Either way all task pages are marked stale and the
//!    active filter is refetched in the background.
//!
//! Snapshots belong to a single call. Overlapping mutations each roll back to
//! their own snapshot, and whichever of reconciliation or background refetch
//! lands last decides what the entry holds.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cache::{CachedPage, QueryCache, QueryKey, Snapshot, TASKS_NAMESPACE};
use super::error::{SyncError, SyncResult};
use super::filter::TaskFilter;
use super::remote::RemoteTaskService;
use crate::types::{Task, TaskPatch, TaskStatus, validate_title};

/// Applies mutations to the cache optimistically and settles them against the server.
pub struct MutationCoordinator {
    cache: Arc<QueryCache>,
    remote: Arc<dyn RemoteTaskService>,
    next_placeholder: AtomicI64,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl MutationCoordinator {
    pub fn new(cache: Arc<QueryCache>, remote: Arc<dyn RemoteTaskService>) -> Self {
        Self {
            cache,
            remote,
            next_placeholder: AtomicI64::new(-1),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Next placeholder id: -1, -2, ... Never collides with a server id.
    fn next_placeholder_id(&self) -> i64 {
        self.next_placeholder.fetch_sub(1, Ordering::Relaxed)
    }

    /// Create a task titled `title`.
    pub async fn create(&self, filter: &TaskFilter, title: &str) -> SyncResult<Task> {
        let title = validate_title(title).map_err(SyncError::Validation)?;
        let key = QueryKey::tasks(filter);

        let now = Utc::now();
        let placeholder = Task {
            id: self.next_placeholder_id(),
            title: title.clone(),
            status: TaskStatus::Pending,
            user_id: 0,
            created_at: now,
            updated_at: now,
        };
        let placeholder_id = placeholder.id;

        let snapshot = self.cache.snapshot(&key);
        if snapshot.is_some() {
            self.cache
                .patch(&key, |page| prepend(page, filter, placeholder));
        }

        let outcome = self.remote.create_task(&title).await;
        self.settle(filter, &key, snapshot, outcome, |page, task| {
            reconcile(page, filter, placeholder_id, task, false)
        })
    }

    /// Apply `patch` to task `id`.
    pub async fn update(&self, filter: &TaskFilter, id: i64, patch: TaskPatch) -> SyncResult<Task> {
        if patch.is_empty() {
            return Err(SyncError::Validation("No fields to update".to_string()));
        }
        let patch = TaskPatch {
            title: patch
                .title
                .as_deref()
                .map(validate_title)
                .transpose()
                .map_err(SyncError::Validation)?,
            status: patch.status,
        };
        let key = QueryKey::tasks(filter);

        let snapshot = self.cache.snapshot(&key);
        if snapshot.is_some() {
            let now = Utc::now();
            self.cache.patch(&key, |page| {
                replace_visible(page, filter, id, |task| patch.apply_to(task, now))
            });
        }

        let outcome = self.remote.update_task(id, &patch).await;
        self.settle(filter, &key, snapshot, outcome, |page, task| {
            reconcile(page, filter, id, task, true)
        })
    }

    /// Flip task `id` between pending and done.
    pub async fn toggle(&self, filter: &TaskFilter, id: i64) -> SyncResult<Task> {
        let key = QueryKey::tasks(filter);

        let snapshot = self.cache.snapshot(&key);
        if snapshot.is_some() {
            let now = Utc::now();
            self.cache.patch(&key, |page| {
                replace_visible(page, filter, id, |task| {
                    let mut toggled = task.clone();
                    toggled.status = task.status.toggled();
                    toggled.updated_at = now;
                    toggled
                })
            });
        }

        let outcome = self.remote.toggle_task(id).await;
        self.settle(filter, &key, snapshot, outcome, |page, task| {
            reconcile(page, filter, id, task, true)
        })
    }

    /// Delete task `id`.
    pub async fn remove(&self, filter: &TaskFilter, id: i64) -> SyncResult<()> {
        let key = QueryKey::tasks(filter);

        let snapshot = self.cache.snapshot(&key);
        if snapshot.is_some() {
            self.cache.patch(&key, |page| {
                if let Some(pos) = page.position(id) {
                    page.tasks.remove(pos);
                    page.adjust_total(-1, filter.limit);
                }
            });
        }

        let outcome = self.remote.delete_task(id).await;
        self.settle(filter, &key, snapshot, outcome, |_, _| {})
    }

    fn settle<T, F>(
        &self,
        filter: &TaskFilter,
        key: &QueryKey,
        snapshot: Option<Snapshot>,
        outcome: SyncResult<T>,
        apply: F,
    ) -> SyncResult<T>
    where
        F: FnOnce(&mut CachedPage, &T),
    {
        match outcome {
            Ok(ref value) => {
                if snapshot.is_some() {
                    self.cache.patch(key, |page| apply(page, value));
                }
            }
            Err(ref err) => {
                debug!(key = %key.filter, "Mutation failed, rolling back: {}", err);
                if let Some(snapshot) = snapshot {
                    self.cache.restore(snapshot);
                }
            }
        }
        self.invalidate(filter);
        outcome
    }

    /// Mark every task page stale and refetch the active one without waiting.
    fn invalidate(&self, filter: &TaskFilter) {
        let marked = self.cache.invalidate_all(TASKS_NAMESPACE);
        debug!(marked, "Invalidated task pages");

        let cache = Arc::clone(&self.cache);
        let remote = Arc::clone(&self.remote);
        let filter = filter.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = cache.fetch(remote.as_ref(), &filter, true).await {
                warn!(key = %filter.key(), "Background refetch failed: {}", e);
            }
        });

        let mut background = self.lock_background();
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    fn lock_background(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for every background refetch started so far.
    pub async fn wait_for_background(&self) {
        loop {
            let pending = std::mem::take(&mut *self.lock_background());
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    warn!("Background refetch task aborted: {}", e);
                }
            }
        }
    }
}

/// Optimistic create: prepend when visible; the total always counts it.
fn prepend(page: &mut CachedPage, filter: &TaskFilter, task: Task) {
    if filter.matches(&task) {
        page.tasks.insert(0, task);
        page.tasks.truncate(filter.limit as usize);
    }
    page.adjust_total(1, filter.limit);
}

/// Optimistic update/toggle of a visible task. Absent tasks are left alone.
fn replace_visible<F>(page: &mut CachedPage, filter: &TaskFilter, id: i64, change: F)
where
    F: FnOnce(&Task) -> Task,
{
    let Some(pos) = page.position(id) else {
        return;
    };
    let next = change(&page.tasks[pos]);
    if filter.matches(&next) {
        page.tasks[pos] = next;
    } else {
        page.tasks.remove(pos);
        page.adjust_total(-1, filter.limit);
    }
}

/// Put the server's record where the local one (`local_id`) was.
///
/// With `count_visibility`, appearing in or vanishing from the page moves
/// `total` by one.
fn reconcile(
    page: &mut CachedPage,
    filter: &TaskFilter,
    local_id: i64,
    task: &Task,
    count_visibility: bool,
) {
    // A refetch may already have brought in the real record.
    if local_id != task.id && page.position(task.id).is_some() {
        if let Some(pos) = page.position(local_id) {
            page.tasks.remove(pos);
        }
    }

    let pos = page.position(local_id).or_else(|| page.position(task.id));
    match (pos, filter.matches(task)) {
        (Some(pos), true) => page.tasks[pos] = task.clone(),
        (Some(pos), false) => {
            page.tasks.remove(pos);
            if count_visibility {
                page.adjust_total(-1, filter.limit);
            }
        }
        (None, true) => {
            if insert_sorted(page, filter.limit, task.clone()) && count_visibility {
                page.adjust_total(1, filter.limit);
            }
        }
        (None, false) => {}
    }
}

/// Insert at the most-recent-first position if that position lies on this page.
fn insert_sorted(page: &mut CachedPage, limit: u32, task: Task) -> bool {
    let limit = limit as usize;
    let idx = page
        .tasks
        .iter()
        .position(|t| (t.created_at, t.id) < (task.created_at, task.id))
        .unwrap_or(page.tasks.len());
    if idx >= limit || (idx == 0 && page.page > 1) {
        return false;
    }
    page.tasks.insert(idx, task);
    page.tasks.truncate(limit);
    true
}
