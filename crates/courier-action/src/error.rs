//! Error types for the approval pipeline.

use std::time::Duration;

use courier_core::error::CourierError;

use crate::task::TaskState;
use crate::types::TaskId;

/// Errors from mapping and executing a single approved action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),
    #[error("Malformed approval request: {0}")]
    Parse(String),
    #[error("Duplicate content: {0}")]
    DuplicateContent(String),
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Remote action failed: {0}")]
    RemoteFailure(String),
    #[error("Storage error: {0}")]
    Storage(#[from] CourierError),
}

impl ActionError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Timeout(_) | ActionError::RemoteFailure(_))
    }

    /// Short machine-friendly name used in audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::Validation(_) => "validation",
            ActionError::UnsupportedAction(_) => "unsupported_action",
            ActionError::Parse(_) => "parse",
            ActionError::DuplicateContent(_) => "duplicate_content",
            ActionError::Timeout(_) => "timeout",
            ActionError::RemoteFailure(_) => "remote_failure",
            ActionError::Storage(_) => "storage",
        }
    }
}

/// Errors from the stage-folder task store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Task not found: {0} in {1}")]
    NotFound(TaskId, TaskState),
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidTransition(TaskState, TaskState),
    #[error("Task already exists: {0} in {1}")]
    AlreadyExists(TaskId, TaskState),
    #[error("Storage error: {0}")]
    Storage(#[from] CourierError),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(CourierError::Io(err))
    }
}
