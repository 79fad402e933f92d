//! Taskdeck library
//!
//! A task-management REST API server and the optimistic, cache-backed client
//! that talks to it. Exported for the binary and for integration tests.

pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod logging;
pub mod types;
