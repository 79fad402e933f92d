//! Errors surfaced by the client and the task cache.

use thiserror::Error;

/// Why a client operation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Malformed input caught before any request was sent.
    #[error("{0}")]
    Validation(String),

    /// The server answered with a non-2xx status.
    #[error("{message} (status {status})")]
    RemoteService { status: u16, message: String },

    /// No usable response was received.
    #[error("network error: {0}")]
    Network(String),
}

impl SyncError {
    /// Build a remote error, falling back to a generic message when the server sent none.
    pub fn remote(status: u16, message: Option<String>) -> Self {
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("Request failed with status {}", status));
        SyncError::RemoteService { status, message }
    }

    /// HTTP status for remote errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::RemoteService { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SyncError::remote(status.as_u16(), None),
            None => SyncError::Network(err.to_string()),
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
