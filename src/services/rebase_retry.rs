//! Rebase a task branch onto the integration branch and retry the merge.
//!
//! A conflicting rebase is always aborted before returning, so the
//! repository is never left mid-rebase.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::validate_branch_name;
use crate::domain::ports::CommandRunner;

/// Exits zero when a rebase is in progress in the current repository.
const REBASE_IN_PROGRESS_PROBE: &str = r#"test -d "$(git rev-parse --git-path rebase-merge)" || test -d "$(git rev-parse --git-path rebase-apply)""#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    Completed,
    /// Stopped on conflicts; the rebase is still in progress
    Conflict,
    /// Failed for another reason, likely a broken repository
    Failed(String),
}

/// Result of [`RebaseRetry::rebase_and_retry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryOutcome {
    /// The branch now sits on top of the target and can be merged again
    pub ready: bool,
    /// A conflicting rebase was aborted
    pub aborted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct RebaseRetry {
    runner: Arc<dyn CommandRunner>,
}

impl RebaseRetry {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Rebase the branch checked out in `cwd` onto `onto`.
    #[instrument(skip(self), fields(cwd = %cwd.display()))]
    pub async fn rebase(&self, onto: &str, cwd: &Path) -> DomainResult<RebaseOutcome> {
        validate_branch_name(onto)?;
        let result = self.runner.run(&format!("git rebase {onto}"), cwd).await?;
        if result.success {
            return Ok(RebaseOutcome::Completed);
        }

        let probe = self.runner.run(REBASE_IN_PROGRESS_PROBE, cwd).await?;
        if probe.success {
            info!("rebase stopped on conflicts");
            Ok(RebaseOutcome::Conflict)
        } else {
            warn!(output = %result.output, "rebase failed");
            Ok(RebaseOutcome::Failed(result.output))
        }
    }

    pub async fn abort(&self, cwd: &Path) -> DomainResult<bool> {
        Ok(self.runner.run("git rebase --abort", cwd).await?.success)
    }

    /// Rebase and report whether the merge can be retried. Conflicts abort
    /// the rebase.
    pub async fn rebase_and_retry(&self, onto: &str, cwd: &Path) -> DomainResult<RetryOutcome> {
        match self.rebase(onto, cwd).await? {
            RebaseOutcome::Completed => Ok(RetryOutcome {
                ready: true,
                ..RetryOutcome::default()
            }),
            RebaseOutcome::Conflict => {
                let aborted = self.abort(cwd).await?;
                if !aborted {
                    warn!(cwd = %cwd.display(), "git rebase --abort failed");
                }
                Ok(RetryOutcome {
                    ready: false,
                    aborted: true,
                    error: (!aborted).then(|| "rebase abort failed".to_string()),
                })
            }
            RebaseOutcome::Failed(error) => Ok(RetryOutcome {
                ready: false,
                aborted: false,
                error: Some(error),
            }),
        }
    }
}
