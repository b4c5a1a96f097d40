//! Error types for ta-core

use thiserror::Error;

/// Main error type for ta-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session limit reached ({limit}); delete an existing session first")]
    SessionLimitExceeded { limit: usize },

    #[error("a response is already pending for this session")]
    ResponsePending,

    #[error("conversation is closed")]
    SessionClosed,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for ta-core
pub type Result<T> = std::result::Result<T, Error>;
