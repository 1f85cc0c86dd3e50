use anyhow::Result;
use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};

use super::Workspace;
use crate::cli::output::truncate;
use crate::cli::types::AuditTypeArg;
use crate::domain::models::{AuditEntry, TaskId};
use crate::services::AuditFilter;

/// Handle audit command
pub fn handle_audit(
    ws: &Workspace,
    task: Option<TaskId>,
    entry_type: Option<AuditTypeArg>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let mut filter = AuditFilter::new().with_limit(limit);
    if let Some(task) = task {
        filter = filter.for_task(task);
    }
    if let Some(entry_type) = entry_type {
        filter = filter.with_type(entry_type.into());
    }
    let entries = ws.audit.query(&filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        if entries.is_empty() {
            println!("No audit entries found.");
            return Ok(());
        }
        println!("{}", format_audit_table(&entries));
        println!("\nShowing {} entr(ies)", entries.len());
    }
    Ok(())
}

fn format_audit_table(entries: &[AuditEntry]) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Time", "Task", "Type", "Action", "Details"]
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(entry.task_id.as_str()),
            Cell::new(entry.entry_type.as_str()),
            Cell::new(&entry.action),
            Cell::new(truncate(&entry.payload.to_string(), 60)),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AuditEntryType;

    #[test]
    fn test_audit_table_includes_action_and_payload() {
        let entry = AuditEntry::new("ch-1".into(), AuditEntryType::Merge, "merged")
            .with_field("commit", "abc123");
        let rendered = format_audit_table(&[entry]);
        assert!(rendered.contains("merged"));
        assert!(rendered.contains("abc123"));
    }
}
