//! Table output formatting for CLI commands using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;
use crate::domain::models::{Task, TaskStatus};
use crate::services::ScoredTask;

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    pub fn format_tasks(&self, tasks: &[Task]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["ID", "Title", "Status", "Deps", "Tags", "Retries"]));

        for task in tasks {
            let deps = if task.dependencies.is_empty() {
                "-".to_string()
            } else {
                task.dependencies
                    .iter()
                    .map(|d| d.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let tags = if task.tags.is_empty() {
                "-".to_string()
            } else {
                task.tags.join(", ")
            };

            table.add_row(vec![
                Cell::new(task.id.as_str()),
                Cell::new(truncate(&task.title, 48)),
                self.status_cell(task.status),
                Cell::new(truncate(&deps, 24)),
                Cell::new(truncate(&tags, 24)),
                Cell::new(task.execution.retry_count.to_string()),
            ]);
        }

        table.to_string()
    }

    /// Ranked candidates with their scores, best first.
    pub fn format_ranking(&self, ranking: &[ScoredTask], tasks: &[Task]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["#", "ID", "Title", "Score"]));

        for (i, scored) in ranking.iter().enumerate() {
            let title = tasks
                .iter()
                .find(|t| t.id == scored.task_id)
                .map_or("-", |t| t.title.as_str());
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(scored.task_id.as_str()),
                Cell::new(truncate(title, 48)),
                Cell::new(scored.score),
            ]);
        }

        table.to_string()
    }

    fn status_cell(&self, status: TaskStatus) -> Cell {
        if self.use_colors {
            Cell::new(status.as_str()).fg(status_color(status))
        } else {
            Cell::new(format!("{} {}", status_icon(status), status))
        }
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|n| Cell::new(n).add_attribute(Attribute::Bold))
        .collect()
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Todo => Color::White,
        TaskStatus::Doing => Color::Cyan,
        TaskStatus::Done => Color::Green,
        TaskStatus::Failed => Color::Red,
    }
}

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "○",
        TaskStatus::Doing => "⟳",
        TaskStatus::Done => "✓",
        TaskStatus::Failed => "✗",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_table_without_colors() {
        let tasks = vec![
            Task::new("ch-1", "Set up workspace").with_tags(["m1"]),
            Task::new("ch-2", "Wire merge queue").with_dependencies(["ch-1"]),
        ];
        let rendered = TableFormatter::with_config(false, Some(120)).format_tasks(&tasks);
        assert!(rendered.contains("ch-1"));
        assert!(rendered.contains("○ todo"));
        assert!(rendered.contains("m1"));
    }

    #[test]
    fn test_ranking_table_numbers_rows() {
        let tasks = vec![Task::new("ch-3", "Write docs")];
        let ranking = vec![ScoredTask {
            task_id: "ch-3".into(),
            score: 150,
        }];
        let rendered = TableFormatter::with_config(false, Some(120)).format_ranking(&ranking, &tasks);
        assert!(rendered.contains("Write docs"));
        assert!(rendered.contains("150"));
    }
}
