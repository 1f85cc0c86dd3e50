//! Returns orphaned `doing` tasks to the pool after a restart.
//!
//! A task still `doing` at startup was claimed by a process that is gone.
//! Recovery resets it to `todo`, bumps its retry count and writes a
//! `crash_recovery` audit entry. It runs once, before the orchestration loop
//! makes any assignment.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::audit_trail::AuditTrail;
use super::event_bus::{CoreEvent, EventBus};
use super::task_graph::TaskGraph;
use crate::domain::errors::DomainResult;
use crate::domain::models::{AuditEntry, AuditEntryType, RecoveryContext, Task, TaskId, TaskStatus};
use crate::domain::ports::WorktreeManager;

pub const RESET_ACTION: &str = "reset_to_todo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveredTask {
    pub task_id: TaskId,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub recovered: Vec<RecoveredTask>,
}

impl RecoveryReport {
    pub fn recovered_ids(&self) -> Vec<TaskId> {
        self.recovered.iter().map(|r| r.task_id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.recovered.is_empty()
    }
}

#[derive(Clone)]
pub struct CrashRecovery {
    audit: AuditTrail,
    worktrees: Arc<dyn WorktreeManager>,
    events: Option<EventBus>,
}

impl CrashRecovery {
    pub fn new(audit: AuditTrail, worktrees: Arc<dyn WorktreeManager>) -> Self {
        Self {
            audit,
            worktrees,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    #[instrument(skip_all)]
    pub fn recover_orphaned_tasks(&self, graph: &mut TaskGraph) -> DomainResult<RecoveryReport> {
        let orphaned: Vec<TaskId> = graph
            .with_status(TaskStatus::Doing)
            .map(|t| t.id.clone())
            .collect();
        let mut report = RecoveryReport::default();

        for id in orphaned {
            let previous = graph.reset_orphan(&id)?;
            let retry_count = previous + 1;
            self.audit.append(
                AuditEntry::new(id.clone(), AuditEntryType::CrashRecovery, RESET_ACTION)
                    .with_field("previous_retry_count", previous)
                    .with_field("retry_count", retry_count),
            )?;
            warn!(task_id = %id, retry_count, "orphaned task returned to todo");
            if let Some(events) = &self.events {
                events.publish(CoreEvent::TaskRecovered {
                    task_id: id.clone(),
                    retry_count,
                });
            }
            report.recovered.push(RecoveredTask { task_id: id, retry_count });
        }

        if !report.is_empty() {
            info!(recovered = report.recovered.len(), "crash recovery finished");
        }
        Ok(report)
    }

    /// Context for resuming a task that has crashed before; `None` on a
    /// first attempt.
    pub async fn recovery_context(&self, task: &Task) -> Option<RecoveryContext> {
        let retry_count = task.execution.retry_count;
        if retry_count == 0 {
            return None;
        }

        let has_worktree_changes = match &task.execution.worktree {
            Some(path) => self
                .worktrees
                .has_uncommitted_changes(path)
                .await
                .unwrap_or_else(|err| {
                    warn!(task_id = %task.id, error = %err, "worktree probe failed");
                    false
                }),
            None => false,
        };

        let mut message = format!(
            "This is retry #{retry_count}; a previous attempt crashed before finishing."
        );
        if has_worktree_changes {
            message.push_str(
                " Uncommitted changes were found in the worktree; review them before continuing.",
            );
        }

        Some(RecoveryContext {
            retry_count,
            audit_entries: self.audit.history(&task.id),
            has_worktree_changes,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::jsonl::MemoryTaskLog;
    use crate::domain::ports::TaskLog;
    use async_trait::async_trait;
    use std::path::Path;

    struct DirtyWorktrees(bool);

    #[async_trait]
    impl WorktreeManager for DirtyWorktrees {
        async fn remove(&self, _path: &Path) -> DomainResult<()> {
            Ok(())
        }

        async fn has_uncommitted_changes(&self, _path: &Path) -> DomainResult<bool> {
            Ok(self.0)
        }
    }

    fn setup(dirty: bool) -> (TaskGraph, CrashRecovery) {
        let log: Arc<dyn TaskLog> = Arc::new(MemoryTaskLog::new());
        let graph = TaskGraph::new(Arc::clone(&log), "ch");
        let recovery = CrashRecovery::new(AuditTrail::new(log), Arc::new(DirtyWorktrees(dirty)));
        (graph, recovery)
    }

    #[test]
    fn test_only_doing_tasks_are_reset() {
        let (mut graph, recovery) = setup(false);
        let todo = graph.create("todo", vec![], vec![]).unwrap();
        let doing = graph.create("doing", vec![], vec![]).unwrap();
        let done = graph.create("done", vec![], vec![]).unwrap();
        graph.claim(&doing).unwrap();
        graph.claim(&done).unwrap();
        graph.complete(&done).unwrap();

        let report = recovery.recover_orphaned_tasks(&mut graph).unwrap();
        assert_eq!(report.recovered_ids(), vec![doing.clone()]);
        assert_eq!(graph.get(&doing).unwrap().status, TaskStatus::Todo);
        assert_eq!(graph.get(&todo).unwrap().execution.retry_count, 0);
        assert_eq!(graph.get(&done).unwrap().status, TaskStatus::Done);
    }

    #[test]
    fn test_audit_entry_records_previous_retry_count() {
        let (mut graph, recovery) = setup(false);
        let id = graph.create("x", vec![], vec![]).unwrap();
        for round in 0..2u32 {
            graph.claim(&id).unwrap();
            let report = recovery.recover_orphaned_tasks(&mut graph).unwrap();
            assert_eq!(report.recovered[0].retry_count, round + 1);
        }
        let history = recovery.audit.history(&id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].entry_type, AuditEntryType::CrashRecovery);
        assert_eq!(history[1].action, RESET_ACTION);
        assert_eq!(history[1].field("previous_retry_count"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_no_context_on_first_attempt() {
        let (mut graph, recovery) = setup(true);
        let id = graph.create("x", vec![], vec![]).unwrap();
        assert!(recovery.recovery_context(graph.get(&id).unwrap()).await.is_none());
    }

    #[tokio::test]
    async fn test_context_mentions_retry_and_changes() {
        let (mut graph, recovery) = setup(true);
        let id = graph.create("x", vec![], vec![]).unwrap();
        graph.claim(&id).unwrap();
        graph
            .set_workspace(&id, "/wt/ch-1".into(), "task/ch-1".into())
            .unwrap();
        recovery.recover_orphaned_tasks(&mut graph).unwrap();

        let ctx = recovery.recovery_context(graph.get(&id).unwrap()).await.unwrap();
        assert_eq!(ctx.retry_count, 1);
        assert!(ctx.has_worktree_changes);
        assert_eq!(ctx.audit_entries.len(), 1);
        assert!(ctx.message.contains("retry #1"));
        assert!(ctx.message.contains("Uncommitted changes"));
    }

    #[tokio::test]
    async fn test_context_without_worktree_reports_clean() {
        let (mut graph, recovery) = setup(true);
        let id = graph.create("x", vec![], vec![]).unwrap();
        graph.claim(&id).unwrap();
        recovery.recover_orphaned_tasks(&mut graph).unwrap();
        let ctx = recovery.recovery_context(graph.get(&id).unwrap()).await.unwrap();
        assert!(!ctx.has_worktree_changes);
        assert!(!ctx.message.contains("Uncommitted"));
    }
}
