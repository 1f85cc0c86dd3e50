use anyhow::{Context, Result};
use serde::Serialize;

use super::Workspace;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Task, TaskId, TaskStatus};
use crate::services::{ScoredTask, SelectionContext, TaskSelector};

#[derive(Debug, Serialize)]
pub struct TaskAdded {
    pub task: Task,
    /// Dependencies not (yet) present in the graph
    pub unknown_dependencies: Vec<TaskId>,
}

impl CommandOutput for TaskAdded {
    fn to_human(&self) -> String {
        let task = &self.task;
        let mut lines = vec![
            "Task added successfully!".to_string(),
            format!("  Task ID: {}", task.id),
            format!("  Title: {}", task.title),
            format!("  Priority: {}", task.priority),
        ];
        if !task.dependencies.is_empty() {
            lines.push(format!("  Dependencies: {} task(s)", task.dependencies.len()));
        }
        if !task.tags.is_empty() {
            lines.push(format!("  Tags: {}", task.tags.join(", ")));
        }
        for missing in &self.unknown_dependencies {
            lines.push(format!("  Warning: dependency {missing} does not exist yet"));
        }
        lines.join("\n")
    }
}

/// Handle add command
pub fn handle_add(
    ws: &mut Workspace,
    title: String,
    description: Option<String>,
    depends_on: Vec<TaskId>,
    tags: Vec<String>,
    priority: u8,
    json: bool,
) -> Result<()> {
    let unknown_dependencies: Vec<TaskId> = depends_on
        .iter()
        .filter(|d| ws.graph.get(d).is_none())
        .cloned()
        .collect();

    let id = ws.graph.next_id();
    let mut task = Task::new(id.clone(), title)
        .with_dependencies(depends_on)
        .with_tags(tags)
        .with_priority(priority);
    if let Some(description) = description {
        task = task.with_description(description);
    }
    ws.graph.insert(task).context("Failed to add task")?;

    let task = ws
        .graph
        .get(&id)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Task {id} vanished after insert"))?;
    output(
        &TaskAdded {
            task,
            unknown_dependencies,
        },
        json,
    );
    Ok(())
}

/// Handle list command
pub fn handle_list(
    ws: &Workspace,
    status: Option<TaskStatus>,
    tag: Option<String>,
    json: bool,
) -> Result<()> {
    let tasks: Vec<Task> = ws
        .graph
        .tasks()
        .iter()
        .filter(|t| status.map_or(true, |s| t.status == s))
        .filter(|t| tag.as_deref().map_or(true, |tag| t.has_tag(tag)))
        .cloned()
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else {
        if tasks.is_empty() {
            println!("No tasks found.");
            return Ok(());
        }

        println!("{}", TableFormatter::new().format_tasks(&tasks));
        println!("\nShowing {} task(s)", tasks.len());
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct NextTask {
    pub next: Option<Task>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ranking: Vec<ScoredTask>,
    #[serde(skip)]
    ranked_tasks: Vec<Task>,
}

impl CommandOutput for NextTask {
    fn to_human(&self) -> String {
        let mut out = match &self.next {
            Some(task) => format!("Next task: {} {}", task.id, task.title),
            None => "No task is ready to start.".to_string(),
        };
        if !self.ranking.is_empty() {
            out.push_str("\n\n");
            out.push_str(&TableFormatter::new().format_ranking(&self.ranking, &self.ranked_tasks));
        }
        out
    }
}

/// Handle next command
pub fn handle_next(ws: &Workspace, prefer: Vec<String>, explain: bool, json: bool) -> Result<()> {
    let selector = TaskSelector::from_config(&ws.config.selection);
    let mut preferred = ws.config.selection.preferred_tags.clone();
    preferred.extend(prefer);
    let ctx = SelectionContext::new().with_preferred_tags(preferred);

    let tasks = ws.graph.tasks();
    let next = selector.select(tasks, &ctx).cloned();
    let ranking = if explain {
        selector.rank(tasks, &ctx)
    } else {
        Vec::new()
    };

    output(
        &NextTask {
            next,
            ranking,
            ranked_tasks: tasks.to_vec(),
        },
        json,
    );
    Ok(())
}
