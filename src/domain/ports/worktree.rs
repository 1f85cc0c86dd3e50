use async_trait::async_trait;
use std::path::Path;

use crate::domain::errors::DomainResult;

/// Worktree lifecycle and inspection.
#[async_trait]
pub trait WorktreeManager: Send + Sync {
    async fn remove(&self, path: &Path) -> DomainResult<()>;

    async fn has_uncommitted_changes(&self, path: &Path) -> DomainResult<bool>;
}
