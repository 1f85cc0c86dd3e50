use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::shell_quote;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{CommandRunner, WorktreeManager};

/// Worktrees managed with `git worktree`, run from the main repository.
pub struct GitWorktrees {
    runner: Arc<dyn CommandRunner>,
    repo: PathBuf,
}

impl GitWorktrees {
    pub fn new(runner: Arc<dyn CommandRunner>, repo: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            repo: repo.into(),
        }
    }
}

#[async_trait]
impl WorktreeManager for GitWorktrees {
    async fn remove(&self, path: &Path) -> DomainResult<()> {
        let quoted = shell_quote(&path.to_string_lossy());
        let out = self
            .runner
            .run(&format!("git worktree remove {quoted}"), &self.repo)
            .await?;
        if out.success {
            debug!(path = %path.display(), "worktree removed");
            return Ok(());
        }

        warn!(path = %path.display(), output = %out.output, "worktree remove failed, forcing");
        let forced = self
            .runner
            .run(&format!("git worktree remove --force {quoted}"), &self.repo)
            .await?;
        if forced.success {
            Ok(())
        } else {
            Err(DomainError::CommandFailed(format!(
                "failed to remove worktree {}: {}",
                path.display(),
                forced.output
            )))
        }
    }

    async fn has_uncommitted_changes(&self, path: &Path) -> DomainResult<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let out = self.runner.run("git status --porcelain", path).await?;
        if !out.success {
            return Err(DomainError::CommandFailed(format!(
                "git status failed in {}: {}",
                path.display(),
                out.output
            )));
        }
        Ok(!out.output.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::shell::ScriptedCommandRunner;
    use crate::domain::ports::CommandOutput;

    #[tokio::test]
    async fn test_remove_falls_back_to_force() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        runner.respond(
            "git worktree remove '/wt/ch-1'",
            CommandOutput::failed(128, "contains modified files"),
        );
        let worktrees = GitWorktrees::new(runner.clone(), "/repo");

        worktrees.remove(Path::new("/wt/ch-1")).await.unwrap();
        assert_eq!(runner.calls()[1], "git worktree remove --force '/wt/ch-1'");
    }

    #[tokio::test]
    async fn test_porcelain_output_means_changes() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedCommandRunner::new());
        runner.respond("git status --porcelain", CommandOutput::ok(" M src/lib.rs"));
        let worktrees = GitWorktrees::new(runner.clone(), "/repo");

        assert!(worktrees.has_uncommitted_changes(dir.path()).await.unwrap());
        assert_eq!(runner.calls_with_cwd()[0].1, dir.path());
    }

    #[tokio::test]
    async fn test_missing_worktree_is_clean() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        let worktrees = GitWorktrees::new(runner.clone(), "/repo");
        assert!(!worktrees
            .has_uncommitted_changes(Path::new("/definitely/not/here"))
            .await
            .unwrap());
        assert!(runner.calls().is_empty());
    }
}
