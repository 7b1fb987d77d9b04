//! Error types for the I/O collaborators.
//!
//! The engine operations themselves never fail; these only come out of the
//! feed, store and season-stats boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("malformed feed payload: {0}")]
    Malformed(String),
    #[error("feed circuit breaker '{0}' is open")]
    CircuitOpen(String),
    #[error("feed has no more states")]
    Exhausted,
}

impl FeedError {
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FeedError::Status { status, .. } => *status >= 500 || *status == 429,
            FeedError::CircuitOpen(_) => true,
            FeedError::Malformed(_) | FeedError::Exhausted => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store rejected write with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("no participant assigned to slot {slot} in session {session_id}")]
    MissingAssignment { session_id: String, slot: u8 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Connection drops, timeouts and server-side errors are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StoreError::Rejected { status, .. } => *status >= 500 || *status == 429,
            StoreError::Unavailable(_) => true,
            StoreError::MissingAssignment { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("failed to read season stats: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse season stats: {0}")]
    Json(#[from] serde_json::Error),
}
