use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::errors::DomainResult;
use crate::domain::models::{ConflictTier, ResolutionStrategy, TaskId};

/// Resolves a single machine-generated file without judgement.
#[async_trait]
pub trait AutoResolver: Send + Sync {
    async fn resolve(&self, file: &str, tier: ConflictTier, cwd: &Path) -> DomainResult<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResolutionRequest {
    pub task_id: TaskId,
    pub files: Vec<String>,
    pub tier: ConflictTier,
    pub description: String,
    pub cwd: PathBuf,
}

/// Delegates source-level conflict resolution to an AI agent.
#[async_trait]
pub trait AgentResolver: Send + Sync {
    async fn resolve(&self, request: &AgentResolutionRequest) -> DomainResult<bool>;
}

/// Everything a human needs to pick up a merge the ladder gave up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub task_id: TaskId,
    pub worktree: PathBuf,
    pub conflict_files: Vec<String>,
    pub retry_count: u32,
    /// Last rung actually attempted before escalating
    pub last_attempt: Option<ResolutionStrategy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumanAction {
    /// Human resolved and merged by hand
    Merged,
    Skipped,
    Cancelled,
}

impl HumanAction {
    pub fn resolved(&self) -> bool {
        matches!(self, Self::Merged)
    }
}

/// Human-in-the-loop sink; the last rung of the ladder.
#[async_trait]
pub trait HumanEscalation: Send + Sync {
    async fn escalate(&self, request: EscalationRequest) -> DomainResult<HumanAction>;
}
