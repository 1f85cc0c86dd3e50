pub mod audit_trail;
pub mod conflict_classifier;
pub mod crash_recovery;
pub mod dependency_checker;
pub mod event_bus;
pub mod merge_queue;
pub mod merge_service;
pub mod orchestration_loop;
pub mod rebase_retry;
pub mod resolution_ladder;
pub mod slot_manager;
pub mod task_graph;
pub mod task_rollback;
pub mod task_selector;

pub use audit_trail::{AuditFilter, AuditTrail};
pub use conflict_classifier::ConflictClassifier;
pub use crash_recovery::{CrashRecovery, RecoveredTask, RecoveryReport};
pub use dependency_checker::{DependencyChecker, DependencyError, DependencyReport};
pub use event_bus::{CoreEvent, EventBus, EventEnvelope, SequenceNumber};
pub use merge_queue::{FailedMerge, MergeQueue, QueueStats};
pub use merge_service::{MergeHandle, MergeOutcome, MergeService};
pub use orchestration_loop::{LoopHandle, LoopStatus, OrchestrationLoop};
pub use rebase_retry::{RebaseOutcome, RebaseRetry, RetryOutcome};
pub use resolution_ladder::{LadderOutcome, ResolutionLadder};
pub use slot_manager::SlotManager;
pub use task_graph::TaskGraph;
pub use task_rollback::{RollbackReport, TaskRollback};
pub use task_selector::{ScoredTask, SelectionContext, TaskSelector};
