//! Client side of the task API.
//!
//! [`ApiClient`] talks HTTP to the server. [`TaskSession`] sits on top of any
//! [`RemoteTaskService`] and keeps a [`QueryCache`] of task pages, keyed by
//! filter, that mutations patch optimistically before the server confirms.
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskdeck::client::{ApiClient, TaskFilter, TaskSession};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let api = Arc::new(ApiClient::new("http://127.0.0.1:8080")?);
//! let session = TaskSession::new(api, TaskFilter::default());
//! session.load().await?;
//! session.create_task("Buy milk").await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod filter;
pub mod remote;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CachedPage, Pagination, QueryCache, QueryKey, TASKS_NAMESPACE};
pub use coordinator::MutationCoordinator;
pub use error::{SyncError, SyncResult};
pub use filter::{FilterKey, FilterUpdate, TaskFilter};
pub use remote::{ApiClient, AuthService, RemoteTaskService, SessionCookies};
pub use session::{FilterSink, TaskSession};
