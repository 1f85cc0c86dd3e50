//! Merge queue item model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::task::{Task, TaskId, DEFAULT_PRIORITY, LOWEST_PRIORITY};
use crate::domain::errors::{DomainError, DomainResult};

/// Admission status of a queued merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeItemStatus {
    /// At least one dependency has not merged yet
    WaitingDependency,
    /// Eligible for dequeue
    Ready,
    /// Currently being merged into the integration branch
    Processing,
}

impl MergeItemStatus {
    /// Sort rank: in-flight work first, gated work last.
    pub(crate) const fn rank(self) -> u8 {
        match self {
            Self::Processing => 0,
            Self::Ready => 1,
            Self::WaitingDependency => 2,
        }
    }
}

/// A completed task's request to land on the integration branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeItem {
    pub task_id: TaskId,
    pub branch: String,
    pub worktree: PathBuf,
    /// 0 (highest) to 4 (lowest)
    pub priority: u8,
    pub status: MergeItemStatus,
    pub dependencies: Vec<TaskId>,
    pub retry_count: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_at: Option<DateTime<Utc>>,
}

impl MergeItem {
    pub fn new(task_id: impl Into<TaskId>, branch: impl Into<String>, worktree: impl Into<PathBuf>) -> Self {
        Self {
            task_id: task_id.into(),
            branch: branch.into(),
            worktree: worktree.into(),
            priority: DEFAULT_PRIORITY,
            status: MergeItemStatus::WaitingDependency,
            dependencies: Vec::new(),
            retry_count: 0,
            enqueued_at: Utc::now(),
            deferred_at: None,
        }
    }

    /// Build the merge request for a task whose worker just finished.
    pub fn for_task(task: &Task, worktree: impl Into<PathBuf>) -> Self {
        let branch = task
            .execution
            .branch
            .clone()
            .unwrap_or_else(|| task_branch(&task.id));
        Self::new(task.id.clone(), branch, worktree)
            .with_priority(task.priority)
            .with_dependencies(task.dependencies.iter().cloned())
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(LOWEST_PRIORITY);
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    pub fn with_enqueued_at(mut self, enqueued_at: DateTime<Utc>) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred_at.is_some()
    }

    pub fn priority_boost(&self) -> u32 {
        priority_boost(self.priority)
    }
}

/// Ordering boost for a merge priority level.
pub const fn priority_boost(priority: u8) -> u32 {
    match priority {
        0 => 200,
        1 => 100,
        2 => 50,
        3 => 10,
        _ => 0,
    }
}

/// Branch a task's worker commits to.
pub fn task_branch(id: &TaskId) -> String {
    format!("task/{id}")
}

/// Reject ref names that git would refuse or a shell could misread.
pub fn validate_branch_name(name: &str) -> DomainResult<()> {
    let invalid = |why: &str| {
        Err(DomainError::ValidationFailed(format!(
            "invalid branch name '{name}': {why}"
        )))
    };
    if name.is_empty() {
        return invalid("empty");
    }
    if name.starts_with('-') {
        return invalid("must not start with '-'");
    }
    if name.contains("..") {
        return invalid("must not contain '..'");
    }
    if name.ends_with(".lock") || name.ends_with('/') {
        return invalid("bad suffix");
    }
    if let Some(ch) = name.chars().find(|&ch| {
        ch.is_ascii_control()
            || matches!(ch, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\' | '\'' | '"' | '$' | '`' | ';' | '&' | '|')
    }) {
        return invalid(&format!("contains disallowed character {ch:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_boost_table() {
        assert_eq!(
            (0..=5).map(priority_boost).collect::<Vec<_>>(),
            vec![200, 100, 50, 10, 0, 0]
        );
    }

    #[test]
    fn test_branch_name_validation() {
        assert!(validate_branch_name("task/ch-12").is_ok());
        assert!(validate_branch_name("main").is_ok());
        for bad in ["", "-rf", "a..b", "x.lock", "a b", "a;rm", "$(id)", "it's"] {
            assert!(validate_branch_name(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_for_task_copies_dependencies_and_priority() {
        let task = Task::new("ch-4", "wire cli")
            .with_dependencies(["ch-1", "ch-2"])
            .with_priority(1);
        let item = MergeItem::for_task(&task, "/tmp/wt/ch-4");
        assert_eq!(item.branch, "task/ch-4");
        assert_eq!(item.priority, 1);
        assert_eq!(item.dependencies.len(), 2);
        assert_eq!(item.status, MergeItemStatus::WaitingDependency);
    }
}
