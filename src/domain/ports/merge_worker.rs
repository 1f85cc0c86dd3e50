use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ConflictInfo, MergeItem};

/// Outcome of one merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    Merged {
        commit: Option<String>,
    },
    Conflict {
        files: Vec<String>,
        /// Optional per-file detail, matched to `files` by path
        infos: Vec<ConflictInfo>,
    },
}

/// Performs the actual merge of a task branch into the integration branch.
///
/// `Err` means the merge failed for a reason other than conflicts.
#[async_trait]
pub trait MergeWorker: Send + Sync {
    async fn merge(&self, item: &MergeItem) -> DomainResult<MergeResult>;
}
