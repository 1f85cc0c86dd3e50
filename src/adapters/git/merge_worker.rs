use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use super::shell_quote;
use crate::domain::models::{validate_branch_name, ConflictInfo, LineRange, MergeItem};
use crate::domain::ports::{CommandOutput, CommandRunner, MergeResult, MergeWorker};

/// Merges task branches into the integration branch of the main checkout
/// with `--no-ff`, leaving a `[<task-id>]` marker in the merge commit.
///
/// A conflicted merge is aborted before returning so the repository is
/// never left mid-merge. Each conflicted file is reported with the span of
/// base lines either side touched, so overlapping edits classify as COMPLEX.
pub struct GitMergeWorker {
    runner: Arc<dyn CommandRunner>,
    repo: PathBuf,
    main_branch: String,
}

impl GitMergeWorker {
    pub fn new(runner: Arc<dyn CommandRunner>, repo: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            repo: repo.into(),
            main_branch: "main".to_string(),
        }
    }

    pub fn with_main_branch(mut self, branch: impl Into<String>) -> Self {
        self.main_branch = branch.into();
        self
    }

    async fn git(&self, args: &str) -> DomainResult<CommandOutput> {
        self.runner.run(&format!("git {args}"), &self.repo).await
    }

    async fn conflicted_files(&self) -> DomainResult<Vec<String>> {
        let out = self.git("diff --name-only --diff-filter=U").await?;
        Ok(out
            .output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Base lines touched on each side of the merge, per file.
    async fn conflict_infos(&self, branch: &str, files: &[String]) -> DomainResult<Vec<ConflictInfo>> {
        let out = self
            .git(&format!("merge-base {} {branch}", self.main_branch))
            .await?;
        let base = out.output.trim();
        if !out.success || base.is_empty() {
            return Ok(Vec::new());
        }

        let mut infos = Vec::with_capacity(files.len());
        for file in files {
            let path = shell_quote(file);
            let ours = self
                .git(&format!("diff --unified=0 {base} {} -- {path}", self.main_branch))
                .await?;
            let theirs = self
                .git(&format!("diff --unified=0 {base} {branch} -- {path}"))
                .await?;
            if let (Some(ours), Some(theirs)) =
                (changed_base_span(&ours.output), changed_base_span(&theirs.output))
            {
                infos.push(ConflictInfo::new(file.clone()).with_ranges(ours, theirs));
            }
        }
        Ok(infos)
    }
}

/// Span of base lines covered by the hunks of a `--unified=0` diff.
/// Pure insertions count as the line they follow.
fn changed_base_span(diff: &str) -> Option<LineRange> {
    diff.lines()
        .filter_map(|line| line.strip_prefix("@@ -"))
        .filter_map(|rest| {
            let old = rest.split_whitespace().next()?;
            let (start, count) = match old.split_once(',') {
                Some((start, count)) => (start.parse::<u32>().ok()?, count.parse::<u32>().ok()?),
                None => (old.parse::<u32>().ok()?, 1),
            };
            let end = start + count.saturating_sub(1);
            Some(LineRange::new(start, end))
        })
        .reduce(|a, b| LineRange::new(a.start.min(b.start), a.end.max(b.end)))
}

#[async_trait]
impl MergeWorker for GitMergeWorker {
    #[instrument(skip_all, fields(task_id = %item.task_id, branch = %item.branch))]
    async fn merge(&self, item: &MergeItem) -> DomainResult<MergeResult> {
        validate_branch_name(&item.branch)?;
        validate_branch_name(&self.main_branch)?;

        let checkout = self.git(&format!("checkout {}", self.main_branch)).await?;
        if !checkout.success {
            return Err(DomainError::CommandFailed(format!(
                "checkout of {} failed: {}",
                self.main_branch, checkout.output
            )));
        }

        let merge = self
            .git(&format!(
                "merge --no-ff -m 'Merge {} [{}]' {}",
                item.branch, item.task_id, item.branch
            ))
            .await?;

        if merge.success {
            let head = self.git("rev-parse HEAD").await?;
            let commit = head.success.then(|| head.output.trim().to_string());
            info!(commit = ?commit, "branch merged");
            return Ok(MergeResult::Merged { commit });
        }

        let files = self.conflicted_files().await?;
        let infos = if files.is_empty() {
            Vec::new()
        } else {
            self.conflict_infos(&item.branch, &files)
                .await
                .unwrap_or_else(|err| {
                    warn!(error = %err, "could not read conflict ranges");
                    Vec::new()
                })
        };
        let abort = self.git("merge --abort").await?;
        if !abort.success {
            warn!(output = %abort.output, "merge --abort failed");
        }

        if files.is_empty() {
            return Err(DomainError::CommandFailed(format!(
                "merge of {} failed: {}",
                item.branch, merge.output
            )));
        }
        info!(files = files.len(), "merge conflicted, aborted");
        Ok(MergeResult::Conflict { files, infos })
    }
}
