//! Revert the commits a task produced, optionally with everything built on
//! top of it.
//!
//! Task commits carry a `[<task-id>]` marker in their message. Rolling back
//! stages the reverts without committing so the caller can review them.
//! Task statuses are never changed here.

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::audit_trail::AuditTrail;
use super::task_graph::TaskGraph;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{validate_branch_name, AuditEntry, AuditEntryType, TaskId};
use crate::domain::ports::CommandRunner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub task_id: TaskId,
    /// Reverted commits, newest first
    pub commits: Vec<String>,
}

pub struct TaskRollback {
    runner: Arc<dyn CommandRunner>,
    audit: AuditTrail,
    repo: PathBuf,
}

impl TaskRollback {
    pub fn new(runner: Arc<dyn CommandRunner>, audit: AuditTrail, repo: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            audit,
            repo: repo.into(),
        }
    }

    /// Commits whose message carries the task marker, newest first.
    pub async fn find_commits(&self, task_id: &TaskId) -> DomainResult<Vec<String>> {
        validate_branch_name(task_id.as_str())?;
        let command = format!("git log --fixed-strings --grep='[{task_id}]' --format=%H");
        let out = self.runner.run(&command, &self.repo).await?;
        if !out.success {
            return Err(DomainError::CommandFailed(format!(
                "git log for {task_id} failed: {}",
                out.output
            )));
        }
        Ok(out
            .output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Merge commits need a mainline parent to revert against.
    async fn revert_command(&self, sha: &str) -> DomainResult<String> {
        let out = self
            .runner
            .run(&format!("git rev-list --parents -n 1 {sha}"), &self.repo)
            .await?;
        let parents = out.output.split_whitespace().count().saturating_sub(1);
        if out.success && parents > 1 {
            Ok(format!("git revert --no-commit -m 1 {sha}"))
        } else {
            Ok(format!("git revert --no-commit {sha}"))
        }
    }

    /// `None` when the abort went through, otherwise what went wrong.
    async fn abort_revert(&self) -> Option<String> {
        match self.runner.run("git revert --abort", &self.repo).await {
            Ok(out) if out.success => None,
            Ok(out) => Some(out.output),
            Err(e) => Some(e.to_string()),
        }
    }

    /// Stage reverts of every commit for one task.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn rollback(&self, task_id: &TaskId) -> DomainResult<RollbackReport> {
        let commits = self.find_commits(task_id).await?;
        for sha in &commits {
            let command = self.revert_command(sha).await?;
            let out = self.runner.run(&command, &self.repo).await?;
            if !out.success {
                let abort_error = self.abort_revert().await;
                let mut entry =
                    AuditEntry::new(task_id.clone(), AuditEntryType::Rollback, "revert_failed")
                        .with_field("commit", sha.clone())
                        .with_field("error", out.output.clone())
                        .with_field("aborted", abort_error.is_none());
                if let Some(abort_error) = &abort_error {
                    error!(commit = %sha, error = %abort_error, "revert --abort failed, repository left mid-revert");
                    entry = entry.with_field("abort_error", abort_error.clone());
                } else {
                    warn!(commit = %sha, "revert failed, aborted");
                }
                self.audit.append(entry)?;
                return Err(DomainError::CommandFailed(format!(
                    "revert of {sha} for {task_id} failed: {}",
                    out.output
                )));
            }
        }

        self.audit.append(
            AuditEntry::new(task_id.clone(), AuditEntryType::Rollback, "reverted")
                .with_field("commits", commits.clone()),
        )?;
        info!(commits = commits.len(), "task rolled back");
        Ok(RollbackReport {
            task_id: task_id.clone(),
            commits,
        })
    }

    /// Roll back a task and every task that transitively depends on it,
    /// dependents first.
    pub async fn rollback_with_dependents(
        &self,
        graph: &TaskGraph,
        task_id: &TaskId,
    ) -> DomainResult<Vec<RollbackReport>> {
        if graph.get(task_id).is_none() {
            return Err(DomainError::TaskNotFound(task_id.clone()));
        }
        let affected = transitive_dependents(graph, task_id);

        let mut order: Vec<TaskId> = graph
            .topological_sort()
            .into_iter()
            .filter(|id| affected.contains(id))
            .collect();
        order.reverse();

        let mut reports = Vec::with_capacity(order.len());
        for id in &order {
            reports.push(self.rollback(id).await?);
        }
        Ok(reports)
    }
}

/// The task itself plus everything downstream of it.
fn transitive_dependents(graph: &TaskGraph, root: &TaskId) -> HashSet<TaskId> {
    let mut seen = HashSet::from([root.clone()]);
    let mut queue = VecDeque::from([root.clone()]);
    while let Some(current) = queue.pop_front() {
        for task in graph.tasks().iter().filter(|t| t.depends_on(&current)) {
            if seen.insert(task.id.clone()) {
                queue.push_back(task.id.clone());
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::jsonl::MemoryTaskLog;
    use crate::adapters::shell::ScriptedCommandRunner;
    use crate::domain::ports::{CommandOutput, TaskLog};

    fn setup() -> (TaskGraph, Arc<ScriptedCommandRunner>, TaskRollback, AuditTrail) {
        let log: Arc<dyn TaskLog> = Arc::new(MemoryTaskLog::new());
        let graph = TaskGraph::new(Arc::clone(&log), "ch");
        let runner = Arc::new(ScriptedCommandRunner::new());
        let audit = AuditTrail::new(log);
        let rollback = TaskRollback::new(
            Arc::clone(&runner) as Arc<dyn CommandRunner>,
            audit.clone(),
            "/repo",
        );
        (graph, runner, rollback, audit)
    }

    fn log_cmd(id: &str) -> String {
        format!("git log --fixed-strings --grep='[{id}]' --format=%H")
    }

    #[tokio::test]
    async fn test_rollback_reverts_each_commit() {
        let (_graph, runner, rollback, audit) = setup();
        runner.respond(&log_cmd("ch-1"), CommandOutput::ok("bbb\naaa\n"));

        let report = rollback.rollback(&"ch-1".into()).await.unwrap();
        assert_eq!(report.commits, vec!["bbb", "aaa"]);
        let reverts: Vec<String> = runner
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("git revert"))
            .collect();
        assert_eq!(reverts, ["git revert --no-commit bbb", "git revert --no-commit aaa"]);
        assert_eq!(audit.history(&"ch-1".into())[0].action, "reverted");
    }

    #[tokio::test]
    async fn test_failed_revert_aborts() {
        let (_graph, runner, rollback, audit) = setup();
        runner.respond(&log_cmd("ch-1"), CommandOutput::ok("aaa"));
        runner.respond("git revert --no-commit aaa", CommandOutput::failed(1, "conflict"));

        assert!(rollback.rollback(&"ch-1".into()).await.is_err());
        assert!(runner.calls().iter().any(|c| c == "git revert --abort"));
        let entry = &audit.history(&"ch-1".into())[0];
        assert_eq!(entry.action, "revert_failed");
        assert_eq!(entry.payload["aborted"], true);
    }

    #[tokio::test]
    async fn test_merge_commit_reverted_against_mainline() {
        let (_graph, runner, rollback, _audit) = setup();
        runner.respond(&log_cmd("ch-1"), CommandOutput::ok("mmm\n"));
        runner.respond("git rev-list --parents -n 1 mmm", CommandOutput::ok("mmm p1 p2\n"));

        rollback.rollback(&"ch-1".into()).await.unwrap();
        assert!(runner.calls().contains(&"git revert --no-commit -m 1 mmm".to_string()));
    }

    #[tokio::test]
    async fn test_failed_abort_is_recorded() {
        let (_graph, runner, rollback, audit) = setup();
        runner.respond(&log_cmd("ch-1"), CommandOutput::ok("aaa"));
        runner.respond("git revert --no-commit aaa", CommandOutput::failed(1, "conflict"));
        runner.respond("git revert --abort", CommandOutput::failed(128, "no revert in progress"));

        assert!(rollback.rollback(&"ch-1".into()).await.is_err());
        let entry = &audit.history(&"ch-1".into())[0];
        assert_eq!(entry.payload["aborted"], false);
        assert_eq!(entry.payload["abort_error"], "no revert in progress");
    }

    #[tokio::test]
    async fn test_dependents_rolled_back_first() {
        let (mut graph, runner, rollback, _audit) = setup();
        let base = graph.create("base", vec![], vec![]).unwrap();
        let mid = graph.create("mid", vec![base.clone()], vec![]).unwrap();
        let top = graph.create("top", vec![mid.clone()], vec![]).unwrap();
        let unrelated = graph.create("other", vec![], vec![]).unwrap();

        let reports = rollback.rollback_with_dependents(&graph, &base).await.unwrap();
        let order: Vec<TaskId> = reports.into_iter().map(|r| r.task_id).collect();
        assert_eq!(order, vec![top, mid, base]);
        assert!(!runner.calls().contains(&log_cmd(unrelated.as_str())));
    }

    #[tokio::test]
    async fn test_rejects_unsafe_task_id() {
        let (_graph, runner, rollback, _audit) = setup();
        assert!(rollback.rollback(&"x'; rm -rf /".into()).await.is_err());
        assert!(runner.calls().is_empty());
    }
}
