use anyhow::{Context, Result};
use std::sync::Arc;

use super::Workspace;
use crate::adapters::git::GitWorktrees;
use crate::adapters::shell::ShellCommandRunner;
use crate::cli::output::{output, CommandOutput};
use crate::services::{CrashRecovery, RecoveryReport};

impl CommandOutput for RecoveryReport {
    fn to_human(&self) -> String {
        if self.is_empty() {
            return "No orphaned tasks found.".to_string();
        }
        let mut lines = vec![format!("Recovered {} task(s):", self.recovered.len())];
        lines.extend(
            self.recovered
                .iter()
                .map(|r| format!("  {} -> todo (retry #{})", r.task_id, r.retry_count)),
        );
        lines.join("\n")
    }
}

/// Handle recover command
pub fn handle_recover(ws: &mut Workspace, json: bool) -> Result<()> {
    let worktrees = Arc::new(GitWorktrees::new(
        Arc::new(ShellCommandRunner::new()),
        ws.repo.clone(),
    ));
    let recovery = CrashRecovery::new(ws.audit.clone(), worktrees);
    let report = recovery
        .recover_orphaned_tasks(&mut ws.graph)
        .context("Crash recovery failed")?;
    output(&report, json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::RecoveredTask;

    #[test]
    fn test_report_output() {
        assert_eq!(RecoveryReport::default().to_human(), "No orphaned tasks found.");

        let report = RecoveryReport {
            recovered: vec![RecoveredTask {
                task_id: "ch-3".into(),
                retry_count: 2,
            }],
        };
        assert!(report.to_human().contains("ch-3 -> todo (retry #2)"));
        assert_eq!(report.to_json()["recovered"][0]["retry_count"], 2);
    }
}
