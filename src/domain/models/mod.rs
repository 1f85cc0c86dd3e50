pub mod audit;
pub mod config;
pub mod conflict;
pub mod machine;
pub mod merge;
pub mod slot;
pub mod task;

pub use audit::{AuditEntry, AuditEntryType, RecoveryContext};
pub use config::{
    AutoResolveConfig, ClassifierConfig, Config, LogFormat, LoggingConfig, MergeConfig,
    OrchestrationConfig, RotationPolicy, SelectionConfig, SelectionWeights,
};
pub use conflict::{
    ClassifiedConflict, ConflictAnalysis, ConflictInfo, ConflictTier, LineRange,
    ResolutionStrategy,
};
pub use machine::{
    transition_app, transition_loop, AppEffect, AppEvent, AppMode, AppTransition, LoopPhase,
    LoopSignal,
};
pub use merge::{priority_boost, task_branch, validate_branch_name, MergeItem, MergeItemStatus};
pub use slot::SlotId;
pub use task::{ExecutionStats, Task, TaskId, TaskStatus, DEFAULT_PRIORITY, LOWEST_PRIORITY};
