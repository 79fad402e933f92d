//! In-memory task service for client tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use super::error::{SyncError, SyncResult};
use super::filter::TaskFilter;
use super::remote::RemoteTaskService;
use crate::types::{Task, TaskPatch, TaskStatus, TasksPage, total_pages};

const BASE_TS: i64 = 1_700_000_000;

fn created_at(id: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_TS + id, 0).unwrap()
}

#[derive(Default)]
struct FakeState {
    tasks: Vec<Task>,
    next_id: i64,
    fail_next: Option<SyncError>,
    fail_task: HashMap<i64, SyncError>,
    list_calls: usize,
    write_calls: usize,
}

/// Behaves like the real API for a single user. Mutations can be held open
/// behind a gate so tests can observe the optimistic state.
#[derive(Default)]
pub(crate) struct FakeRemote {
    state: Mutex<FakeState>,
    gate: Option<Arc<Notify>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.state.lock().unwrap().next_id = 1;
        remote
    }

    /// `n` pending tasks with ids `1..=n`; higher ids are newer.
    pub fn with_tasks(n: i64) -> Self {
        let remote = Self::new();
        for i in 1..=n {
            remote.seed(&format!("Task {}", i), TaskStatus::Pending);
        }
        remote
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn seed(&self, title: &str, status: TaskStatus) -> Task {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let task = Task {
            id,
            title: title.to_string(),
            status,
            user_id: 1,
            created_at: created_at(id),
            updated_at: created_at(id),
        };
        state.tasks.push(task.clone());
        task
    }

    /// Fail the next mutation with `err`.
    pub fn fail_next(&self, err: SyncError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    /// Fail the next mutation that targets `id`.
    pub fn fail_task(&self, id: i64, err: SyncError) {
        self.state.lock().unwrap().fail_task.insert(id, err);
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn write_calls(&self) -> usize {
        self.state.lock().unwrap().write_calls
    }

    pub fn task(&self, id: i64) -> Option<Task> {
        self.state
            .lock()
            .unwrap()
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    async fn enter(&self, id: Option<i64>) -> SyncResult<()> {
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
        let mut state = self.state.lock().unwrap();
        state.write_calls += 1;
        if let Some(err) = id.and_then(|id| state.fail_task.remove(&id)) {
            return Err(err);
        }
        match state.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn modify<F>(&self, id: i64, f: F) -> SyncResult<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut state = self.state.lock().unwrap();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| SyncError::remote(404, Some("Task not found".into())))?;
        f(task);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}

#[async_trait]
impl RemoteTaskService for FakeRemote {
    async fn list_tasks(&self, filter: &TaskFilter) -> SyncResult<TasksPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        let mut matching: Vec<Task> = state
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = matching.len() as i64;
        let offset = ((filter.page.max(1) - 1) * filter.limit) as usize;
        let tasks = matching
            .into_iter()
            .skip(offset)
            .take(filter.limit as usize)
            .collect();
        Ok(TasksPage {
            tasks,
            total,
            page: filter.page,
            total_pages: total_pages(total, filter.limit),
        })
    }

    async fn create_task(&self, title: &str) -> SyncResult<Task> {
        self.enter(None).await?;
        Ok(self.seed(title, TaskStatus::Pending))
    }

    async fn update_task(&self, id: i64, patch: &TaskPatch) -> SyncResult<Task> {
        self.enter(Some(id)).await?;
        self.modify(id, |task| {
            if let Some(ref title) = patch.title {
                task.title = title.clone();
            }
            if let Some(status) = patch.status {
                task.status = status;
            }
        })
    }

    async fn delete_task(&self, id: i64) -> SyncResult<()> {
        self.enter(Some(id)).await?;
        let mut state = self.state.lock().unwrap();
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != id);
        if state.tasks.len() == before {
            return Err(SyncError::remote(404, Some("Task not found".into())));
        }
        Ok(())
    }

    async fn toggle_task(&self, id: i64) -> SyncResult<Task> {
        self.enter(Some(id)).await?;
        self.modify(id, |task| task.status = task.status.toggled())
    }
}
