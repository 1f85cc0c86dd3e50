//! Domain errors for the Chorus orchestrator.

use thiserror::Error;

use super::models::{TaskId, TaskStatus};

/// Domain-level errors that can occur while scheduling or merging work.
///
/// Dependency-graph problems are deliberately absent: those are reported as
/// data through [`crate::services::DependencyReport`].
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid state transition for {task_id} from {from} to {to}")]
    InvalidStateTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Merge item not found: {0}")]
    MergeItemNotFound(TaskId),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Worker spawn failed for {task_id}: {reason}")]
    WorkerSpawnFailed { task_id: TaskId, reason: String },

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}
