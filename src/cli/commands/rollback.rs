use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use super::Workspace;
use crate::adapters::shell::ShellCommandRunner;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::TaskId;
use crate::services::{RollbackReport, TaskRollback};

#[derive(Debug, Serialize)]
pub struct RollbackOutput {
    pub reports: Vec<RollbackReport>,
}

impl CommandOutput for RollbackOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        for report in &self.reports {
            if report.commits.is_empty() {
                lines.push(format!("{}: no commits found", report.task_id));
            } else {
                lines.push(format!(
                    "{}: staged revert of {} commit(s)",
                    report.task_id,
                    report.commits.len()
                ));
            }
        }
        lines.push("Review the staged changes and commit them when ready.".to_string());
        lines.join("\n")
    }
}

/// Handle rollback command
pub async fn handle_rollback(
    ws: &Workspace,
    task: TaskId,
    with_dependents: bool,
    json: bool,
) -> Result<()> {
    let rollback = TaskRollback::new(
        Arc::new(ShellCommandRunner::new()),
        ws.audit.clone(),
        ws.repo.clone(),
    );

    let reports = if with_dependents {
        rollback
            .rollback_with_dependents(&ws.graph, &task)
            .await
            .with_context(|| format!("Failed to roll back {task} and its dependents"))?
    } else {
        if ws.graph.get(&task).is_none() {
            anyhow::bail!("Task {task} not found. Use 'chorus list' to see available tasks.");
        }
        vec![rollback
            .rollback(&task)
            .await
            .with_context(|| format!("Failed to roll back {task}"))?]
    };

    output(&RollbackOutput { reports }, json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_marks_tasks_without_commits() {
        let out = RollbackOutput {
            reports: vec![
                RollbackReport {
                    task_id: "ch-2".into(),
                    commits: vec!["abc".into()],
                },
                RollbackReport {
                    task_id: "ch-1".into(),
                    commits: Vec::new(),
                },
            ],
        };
        let text = out.to_human();
        assert!(text.contains("ch-2: staged revert of 1 commit(s)"));
        assert!(text.contains("ch-1: no commits found"));
    }
}
