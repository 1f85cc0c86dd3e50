//! Git-backed implementations of the merge and worktree ports.
//!
//! Every git invocation goes through a [`CommandRunner`] so tests can script
//! the repository's answers.
//!
//! [`CommandRunner`]: crate::domain::ports::CommandRunner

pub mod auto_resolver;
pub mod merge_worker;
pub mod worktrees;

pub use auto_resolver::CommandAutoResolver;
pub use merge_worker::GitMergeWorker;
pub use worktrees::GitWorktrees;

/// Single-quote a path for `sh -c`.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
