// src/error.rs
// Closed error taxonomy for the control plane (spec §7).

use thiserror::Error;

/// Main error type for dlwatch.
///
/// Every variant here is one of the kinds named in the error-handling design:
/// transport failures, the engine reporting a missing task, storage I/O
/// failures, bad user input, and the chat API's own failure modes. Handler
/// code matches on this exhaustively so a new kind can't silently fall
/// through to a generic reply.
#[derive(Error, Debug)]
pub enum AppError {
    /// Transport-level failure talking to the download engine or chat API.
    #[error("connection error: {0}")]
    Connection(String),

    /// The engine replied, but with a malformed, unauthorized, or
    /// server-side error response.
    #[error("request error: {0}")]
    Request(String),

    /// The engine reported that a gid does not exist.
    #[error("task not found")]
    TaskNotFound,

    /// The history store failed to read or write.
    #[error("storage error: {0}")]
    Storage(String),

    /// Bad user-supplied input (command arg, gid, url) rejected before any
    /// side effect ran.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The invoking user is not in `authorized_users`.
    #[error("unauthorized")]
    Unauthorized,

    /// The chat API asked the caller to back off for a number of seconds.
    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),

    /// An edit that would be a no-op; callers treat this as success.
    #[error("message not modified")]
    MessageNotModified,

    /// The message or chat being edited no longer exists.
    #[error("message or chat gone")]
    MessageGone,

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Convert to a short, user-facing string for command replies. Never
    /// leaks a transport stack trace past a handler boundary.
    pub fn to_user_string(&self) -> String {
        match self {
            AppError::Connection(_) => "could not reach the download engine".to_string(),
            AppError::Request(_) => "the download engine rejected the request".to_string(),
            AppError::TaskNotFound => "task not found".to_string(),
            AppError::Storage(_) => "could not query or write history".to_string(),
            AppError::InvalidArgument(msg) => format!("usage error: {msg}"),
            AppError::Unauthorized => "you are not authorized to use this bot".to_string(),
            AppError::Config(msg) => format!("configuration error: {msg}"),
            _ => "system error".to_string(),
        }
    }
}

impl From<deadpool_sqlite::PoolError> for AppError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for AppError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        AppError::Storage(err.to_string())
    }
}
