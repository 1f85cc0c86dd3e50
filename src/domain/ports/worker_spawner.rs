use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::errors::DomainResult;
use crate::domain::models::{RecoveryContext, SlotId, Task, TaskId};

/// A task handed to a worker in a slot.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub task: Task,
    pub slot: SlotId,
    pub worktree: PathBuf,
    pub branch: String,
    /// Present when the task is being retried after a crash
    pub recovery: Option<RecoveryContext>,
}

/// Events workers report back to the orchestration loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Completed { task_id: TaskId },
    Failed { task_id: TaskId, error: String },
    /// One agent iteration finished; `new_commits` since the previous one
    Iteration { task_id: TaskId, new_commits: u32 },
}

/// Starts and cancels worker processes. Workers report back through the
/// loop's [`WorkerEvent`] channel.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self, assignment: Assignment) -> DomainResult<()>;

    async fn cancel(&self, task_id: &TaskId) -> DomainResult<()>;
}
