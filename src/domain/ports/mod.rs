//! Port trait definitions (Hexagonal Architecture)
//!
//! Every side effect the core needs is injected through one of these:
//! - CommandRunner: shell and version-control commands
//! - TaskLog: append-only task and audit persistence
//! - MergeWorker: merging a task branch into the integration branch
//! - AutoResolver / AgentResolver / HumanEscalation: the resolution ladder's rungs
//! - WorkerSpawner: starting and cancelling agent workers
//! - WorktreeManager: worktree cleanup and inspection

pub mod command_runner;
pub mod merge_worker;
pub mod resolvers;
pub mod task_log;
pub mod worker_spawner;
pub mod worktree;

pub use command_runner::{CommandOutput, CommandRunner};
pub use merge_worker::{MergeResult, MergeWorker};
pub use resolvers::{
    AgentResolutionRequest, AgentResolver, AutoResolver, EscalationRequest, HumanAction,
    HumanEscalation,
};
pub use task_log::{LogRecord, TaskLog};
pub use worker_spawner::{Assignment, WorkerEvent, WorkerSpawner};
pub use worktree::WorktreeManager;
