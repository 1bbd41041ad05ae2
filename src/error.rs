//! Error types for the task engine and its store.

use serde::Serialize;
use thiserror::Error;

/// Failures raised by the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate {collection} key: {key}")]
    Duplicate { collection: &'static str, key: String },
}

/// Stable classification of a [`TaskError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    InvalidState,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::InvalidInput(_) => ErrorKind::InvalidInput,
            TaskError::InvalidState(_) => ErrorKind::InvalidState,
            TaskError::Unauthorized(_) => ErrorKind::Unauthorized,
            TaskError::Forbidden(_) => ErrorKind::Forbidden,
            TaskError::NotFound(_) => ErrorKind::NotFound,
            TaskError::Conflict(_) => ErrorKind::Conflict,
            TaskError::Store(_) => ErrorKind::Internal,
        }
    }

    /// HTTP-style status hint for the boundary layer.
    pub fn status(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput | ErrorKind::InvalidState => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TaskError::InvalidInput(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        TaskError::NotFound(msg.into())
    }

    pub(crate) fn forbidden(msg: impl Into<String>) -> Self {
        TaskError::Forbidden(msg.into())
    }
}

pub type TaskResult<T> = Result<T, TaskError>;
