use std::time::Duration;

use thiserror::Error;

/// Errors raised by a storage backend or change feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// No row with this id exists in the table.
    #[error("record not found: {table}:{id}")]
    NotFound { table: String, id: String },
    /// The backend refused the write (constraint, authorization, validation).
    #[error("{0}")]
    Rejected(String),
    /// A row could not be encoded or decoded.
    #[error("record serialization error: {0}")]
    Serde(String),
    /// Storage-level failure.
    #[error("storage error: {0}")]
    Storage(String),
    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serde(err.to_string())
    }
}

/// Error type for every synchronization operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No current owner is set on the session.
    #[error("authentication required")]
    Unauthenticated,
    /// A create/update/remove call was rejected by the backend.
    #[error("persistence failed: {0}")]
    Persistence(String),
    /// Loading the record list failed.
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// Subscribing to the change feed failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    /// The call did not settle within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    /// The call was cancelled before it settled.
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Message suitable for a notification body, without the variant prefix.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Unauthenticated => "You need to be signed in to do that.".to_string(),
            SyncError::Persistence(msg) | SyncError::Fetch(msg) => msg.clone(),
            SyncError::Backend(err) => err.to_string(),
            SyncError::Timeout(_) => "The request took too long. Please try again.".to_string(),
            SyncError::Cancelled => "The request was cancelled.".to_string(),
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::Unauthenticated)
    }
}

/// Normalized error handed to operation callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationError {
    pub message: String,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&SyncError> for OperationError {
    fn from(err: &SyncError) -> Self {
        OperationError::new(err.user_message())
    }
}
