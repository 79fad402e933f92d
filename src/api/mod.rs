//! REST API server.
//!
//! Serves authentication under `/auth` and the owner-scoped task collection
//! under `/tasks`. Session tokens travel in HTTP-only cookies.

pub mod auth;
mod server;
pub mod tasks;

pub use server::{AppState, ServerHandle, build_router, start_server};
