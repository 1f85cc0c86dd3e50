//! Task domain model.
//!
//! Tasks are the units of work handed to agent workers. They form a graph
//! through their dependency ids and move monotonically through
//! `todo -> doing -> {done | failed}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::errors::{DomainError, DomainResult};

/// Merge priority given to tasks that don't ask for one.
pub const DEFAULT_PRIORITY: u8 = 2;

/// Lowest merge priority (0 is the most urgent).
pub const LOWEST_PRIORITY: u8 = 4;

/// Sequential task identifier such as `ch-12`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the `n`th id for a prefix.
    pub fn sequential(prefix: &str, n: u64) -> Self {
        Self(format!("{prefix}-{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric suffix after the last `-`, if there is one.
    pub fn sequence(&self) -> Option<u64> {
        self.0.rsplit_once('-').and_then(|(_, n)| n.parse().ok())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting to be picked up
    #[default]
    Todo,
    /// Claimed by a worker slot
    Doing,
    /// Worker finished and the result is merged
    Done,
    /// Worker or merge failed terminally
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Forward transitions only. The `doing -> todo` path back belongs to
    /// crash recovery and is not expressed here.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Todo, Self::Doing) | (Self::Doing, Self::Done) | (Self::Doing, Self::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "doing" | "in_progress" => Ok(Self::Doing),
            "done" | "closed" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown task status '{other}'"
            ))),
        }
    }
}

/// Execution bookkeeping carried on each task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionStats {
    pub iterations: u32,
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub worktree: Option<PathBuf>,
    pub branch: Option<String>,
}

/// A unit of work in the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Merge priority, 0 (highest) to 4 (lowest).
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub execution: ExecutionStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            dependencies: Vec::new(),
            tags: Vec::new(),
            priority: DEFAULT_PRIORITY,
            execution: ExecutionStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set dependencies, dropping duplicates while keeping first-seen order.
    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.dependencies.clear();
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.clear();
        for tag in tags {
            let tag = tag.into();
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(LOWEST_PRIORITY);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// First milestone tag on the task (`m1`, `m2-cli`, ...).
    pub fn milestone(&self) -> Option<&str> {
        self.tags
            .iter()
            .map(String::as_str)
            .find(|tag| is_milestone_tag(tag))
    }

    pub fn depends_on(&self, id: &TaskId) -> bool {
        self.dependencies.contains(id)
    }

    /// Apply a forward status transition.
    pub(crate) fn transition_to(&mut self, next: TaskStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        match next {
            TaskStatus::Doing => self.execution.started_at = Some(now),
            TaskStatus::Done | TaskStatus::Failed => self.execution.completed_at = Some(now),
            TaskStatus::Todo => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Milestone tags are an `m` followed by a digit.
pub fn is_milestone_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars.next() == Some('m') && chars.next().is_some_and(|c| c.is_ascii_digit())
}
