//! Infrastructure adapters for external systems.

pub mod escalation;
pub mod git;
pub mod jsonl;
pub mod shell;

pub use escalation::{ChannelEscalation, PendingEscalation};
pub use git::{CommandAutoResolver, GitMergeWorker, GitWorktrees};
pub use jsonl::{JsonlTaskLog, MemoryTaskLog};
pub use shell::{ScriptedCommandRunner, ShellCommandRunner};
