use anyhow::{bail, Result};
use serde::Serialize;

use super::Workspace;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::TaskId;
use crate::services::DependencyError;

#[derive(Debug, Serialize)]
pub struct ValidationOutput {
    pub valid: bool,
    pub task_count: usize,
    pub errors: Vec<DependencyError>,
    /// Execution order, only when the graph is valid
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<TaskId>,
}

impl CommandOutput for ValidationOutput {
    fn to_human(&self) -> String {
        if self.valid {
            let order = self
                .order
                .iter()
                .map(TaskId::as_str)
                .collect::<Vec<_>>()
                .join(" -> ");
            return format!("Graph is valid ({} task(s))\n  Order: {order}", self.task_count);
        }
        let mut lines = vec![format!("Graph has {} problem(s):", self.errors.len())];
        lines.extend(self.errors.iter().map(|e| format!("  - {e}")));
        lines.join("\n")
    }
}

/// Handle validate command. Exits non-zero when the graph has problems.
pub fn handle_validate(ws: &Workspace, json: bool) -> Result<()> {
    let report = ws.graph.check();
    let valid = report.is_valid();
    let result = ValidationOutput {
        valid,
        task_count: ws.graph.len(),
        order: if valid {
            ws.graph.topological_sort()
        } else {
            Vec::new()
        },
        errors: report.errors,
    };
    output(&result, json);

    if !valid {
        bail!("dependency graph is invalid");
    }
    Ok(())
}
