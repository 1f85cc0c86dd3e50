//! Command runner adapters.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::process::Command;
use tracing::{debug, trace};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{CommandOutput, CommandRunner};

/// Runs commands through `sh -c` in the given directory.
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner;

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str, cwd: &Path) -> DomainResult<CommandOutput> {
        debug!(command, cwd = %cwd.display(), "running command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| DomainError::CommandFailed(format!("failed to start '{command}': {e}")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        let combined = combined.trim_end().to_string();
        trace!(command, code = ?output.status.code(), "command finished");

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: combined,
        })
    }
}

/// Canned responses keyed by exact command text, for tests and dry runs.
///
/// Each command may have several queued responses; they are consumed in
/// order and the last one repeats. Unscripted commands succeed with empty
/// output. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedCommandRunner {
    responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    calls: Mutex<Vec<(String, PathBuf)>>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, command: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(command.to_string())
            .or_default()
            .push_back(output);
    }

    /// Commands run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(c, _)| c.clone())
            .collect()
    }

    /// Commands run so far together with their working directories.
    pub fn calls_with_cwd(&self) -> Vec<(String, PathBuf)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, command: &str, cwd: &Path) -> DomainResult<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((command.to_string(), cwd.to_path_buf()));

        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        let output = match responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(output.unwrap_or_else(|| CommandOutput::ok("")))
    }
}
