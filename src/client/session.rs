//! View-facing facade over the cache, the filter, and the mutation coordinator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::cache::{CachedPage, Pagination, QueryCache, QueryKey};
use super::coordinator::MutationCoordinator;
use super::error::SyncResult;
use super::filter::{FilterUpdate, TaskFilter};
use super::remote::RemoteTaskService;
use crate::types::{Task, TaskPatch};

/// Receives filter changes requested through [`TaskSession::set_filters`].
///
/// The filter itself is owned by the caller (a view, a URL, a CLI invocation);
/// the session only reports what the next filter should be.
pub trait FilterSink: Send + Sync {
    fn filters_changed(&self, filter: &TaskFilter);
}

impl<F> FilterSink for F
where
    F: Fn(&TaskFilter) + Send + Sync,
{
    fn filters_changed(&self, filter: &TaskFilter) {
        self(filter)
    }
}

struct Inner {
    cache: Arc<QueryCache>,
    remote: Arc<dyn RemoteTaskService>,
    coordinator: MutationCoordinator,
    filter: Mutex<TaskFilter>,
    sink: Option<Arc<dyn FilterSink>>,
    in_flight: AtomicUsize,
}

/// Task listing plus mutations, bound to one remote service and one cache.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct TaskSession {
    inner: Arc<Inner>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        InFlight(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskSession {
    pub fn new(remote: Arc<dyn RemoteTaskService>, filter: TaskFilter) -> Self {
        Self::with_cache(remote, Arc::new(QueryCache::new()), filter, None)
    }

    /// Build a session around an existing cache, reporting filter changes to `sink`.
    pub fn with_cache(
        remote: Arc<dyn RemoteTaskService>,
        cache: Arc<QueryCache>,
        filter: TaskFilter,
        sink: Option<Arc<dyn FilterSink>>,
    ) -> Self {
        let coordinator = MutationCoordinator::new(Arc::clone(&cache), Arc::clone(&remote));
        Self {
            inner: Arc::new(Inner {
                cache,
                remote,
                coordinator,
                filter: Mutex::new(filter),
                sink,
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn with_sink(self, sink: Arc<dyn FilterSink>) -> Self {
        let filter = self.filters();
        Self::with_cache(
            Arc::clone(&self.inner.remote),
            Arc::clone(&self.inner.cache),
            filter,
            Some(sink),
        )
    }

    fn lock_filter(&self) -> MutexGuard<'_, TaskFilter> {
        self.inner
            .filter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// The active filter.
    pub fn filters(&self) -> TaskFilter {
        self.lock_filter().clone()
    }

    /// Merge `update` into the active filter, report it, and adopt it.
    pub fn set_filters(&self, update: FilterUpdate) -> TaskFilter {
        let next = {
            let mut filter = self.lock_filter();
            let next = filter.merged(&update);
            *filter = next.clone();
            next
        };
        debug!(key = %next.key(), "Filter changed");
        if let Some(ref sink) = self.inner.sink {
            sink.filters_changed(&next);
        }
        next
    }

    fn active_entry(&self) -> Option<CachedPage> {
        self.inner.cache.get(&QueryKey::tasks(&self.filters()))
    }

    /// Tasks cached for the active filter, empty until loaded.
    pub fn tasks(&self) -> Vec<Task> {
        self.active_entry().map(|p| p.tasks).unwrap_or_default()
    }

    /// Pagination for the active filter. Before the first load: no tasks, one page.
    pub fn pagination(&self) -> Pagination {
        match self.active_entry() {
            Some(page) => page.pagination(),
            None => Pagination {
                total: 0,
                page: self.filters().page,
                total_pages: 1,
            },
        }
    }

    /// True while a read is in flight and nothing is cached for the active filter yet.
    pub fn is_loading(&self) -> bool {
        self.is_fetching() && self.active_entry().is_none()
    }

    /// True while any read issued through this session is in flight.
    pub fn is_fetching(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Serve the active filter, from cache when fresh.
    pub async fn load(&self) -> SyncResult<CachedPage> {
        self.fetch(false).await
    }

    /// Refetch the active filter from the server.
    pub async fn refresh(&self) -> SyncResult<CachedPage> {
        self.fetch(true).await
    }

    async fn fetch(&self, force: bool) -> SyncResult<CachedPage> {
        let filter = self.filters();
        let _guard = InFlight::enter(&self.inner.in_flight);
        self.inner
            .cache
            .fetch(self.inner.remote.as_ref(), &filter, force)
            .await
    }

    pub async fn create_task(&self, title: &str) -> SyncResult<Task> {
        let filter = self.filters();
        self.inner.coordinator.create(&filter, title).await
    }

    pub async fn update_task(&self, id: i64, patch: TaskPatch) -> SyncResult<Task> {
        let filter = self.filters();
        self.inner.coordinator.update(&filter, id, patch).await
    }

    pub async fn delete_task(&self, id: i64) -> SyncResult<()> {
        let filter = self.filters();
        self.inner.coordinator.remove(&filter, id).await
    }

    pub async fn toggle_task(&self, id: i64) -> SyncResult<Task> {
        let filter = self.filters();
        self.inner.coordinator.toggle(&filter, id).await
    }

    /// Wait until background refetches triggered by mutations have landed.
    pub async fn settled(&self) {
        self.inner.coordinator.wait_for_background().await
    }

    /// Forget every cached page, e.g. after logging out.
    pub fn clear(&self) {
        self.inner.cache.clear();
    }
}
