use async_trait::async_trait;
use std::path::Path;

use crate::domain::errors::DomainResult;

/// Result of running a shell command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            output: output.into(),
        }
    }

    pub fn failed(code: i32, output: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            output: output.into(),
        }
    }
}

/// Thin abstraction over version-control and shell invocations.
///
/// A non-zero exit is reported through [`CommandOutput::success`]; `Err` is
/// reserved for commands that could not be started at all.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, cwd: &Path) -> DomainResult<CommandOutput>;
}
