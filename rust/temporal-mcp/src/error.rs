use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the history service and its tools.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Listing executions or opening a history cursor failed
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[source] BackendError),

    /// The history cursor failed part way through
    #[error("failed reading history: {0}")]
    HistoryRead(#[source] BackendError),

    #[error("failed to serialize result: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, HistoryError>;
