//! Picks the single best next task for an idle slot.
//!
//! Ready tasks are scored additively; highest score wins and ties go to the
//! oldest task (FIFO), then to the lowest id.

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use crate::domain::models::{SelectionConfig, SelectionWeights, Task, TaskId, TaskStatus};

/// Optional inputs that bias the pick.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    pub last_completed: Option<TaskId>,
    pub exclude: HashSet<TaskId>,
    pub preferred_tags: Vec<String>,
}

impl SelectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_completed(mut self, id: TaskId) -> Self {
        self.last_completed = Some(id);
        self
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = TaskId>) -> Self {
        self.exclude.extend(ids);
        self
    }

    pub fn with_preferred_tags(mut self, tags: Vec<String>) -> Self {
        self.preferred_tags = tags;
        self
    }
}

/// A ready task with its score, for explaining a pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredTask {
    pub task_id: TaskId,
    pub score: i64,
}

#[derive(Debug, Clone)]
pub struct TaskSelector {
    weights: SelectionWeights,
    next_tag: String,
}

impl Default for TaskSelector {
    fn default() -> Self {
        Self::from_config(&SelectionConfig::default())
    }
}

impl TaskSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SelectionConfig) -> Self {
        Self {
            weights: config.weights,
            next_tag: config.next_tag.clone(),
        }
    }

    pub fn weights(&self) -> &SelectionWeights {
        &self.weights
    }

    /// `todo`, not excluded, and every dependency `done`.
    pub fn ready_tasks<'a>(&self, tasks: &'a [Task], ctx: &SelectionContext) -> Vec<&'a Task> {
        let done: HashSet<&TaskId> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| &t.id)
            .collect();

        tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Todo)
            .filter(|t| !ctx.exclude.contains(&t.id))
            .filter(|t| t.dependencies.iter().all(|d| done.contains(d)))
            .collect()
    }

    pub fn score(&self, task: &Task, tasks: &[Task], ctx: &SelectionContext) -> i64 {
        let w = &self.weights;
        let mut score = 0;

        if task.has_tag(&self.next_tag) {
            score += w.user_hint;
        }

        let unblocks = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Todo && t.depends_on(&task.id))
            .count();
        score += w.unblocking * count(unblocks);

        if task.dependencies.is_empty() {
            score += w.atomicity;
        }

        if let Some(milestone) = task.milestone() {
            let finished = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Done && t.id != task.id && t.has_tag(milestone))
                .count();
            score += w.milestone * count(finished);
        }

        if let Some(last) = ctx
            .last_completed
            .as_ref()
            .and_then(|id| tasks.iter().find(|t| &t.id == id))
        {
            let shared = task.tags.iter().filter(|tag| last.has_tag(tag)).count();
            score += w.series * count(shared);
        }

        let preferred = task
            .tags
            .iter()
            .filter(|tag| ctx.preferred_tags.contains(tag))
            .count();
        score += w.preferred * count(preferred);

        score
    }

    /// Ready tasks, best first.
    pub fn rank(&self, tasks: &[Task], ctx: &SelectionContext) -> Vec<ScoredTask> {
        let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
        let mut scored: Vec<_> = self
            .ready_tasks(tasks, ctx)
            .into_iter()
            .map(|t| ScoredTask {
                task_id: t.id.clone(),
                score: self.score(t, tasks, ctx),
            })
            .collect();
        scored.sort_by_key(|s| {
            let created = by_id.get(&s.task_id).map(|t| t.created_at);
            (Reverse(s.score), created, s.task_id.clone())
        });
        scored
    }

    /// Best ready task, or `None` when nothing can start right now.
    pub fn select<'a>(&self, tasks: &'a [Task], ctx: &SelectionContext) -> Option<&'a Task> {
        self.ready_tasks(tasks, ctx)
            .into_iter()
            .min_by_key(|t| (Reverse(self.score(t, tasks, ctx)), t.created_at, t.id.clone()))
    }
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn at(minutes: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn task(id: &str, minutes: i64) -> Task {
        Task::new(id, id).with_created_at(at(minutes))
    }

    fn done(mut t: Task) -> Task {
        t.status = TaskStatus::Done;
        t
    }

    #[test]
    fn test_next_hint_beats_creation_order() {
        let tasks = vec![task("a", 0), task("b", 5).with_tags(["next"])];
        let pick = TaskSelector::new().select(&tasks, &SelectionContext::new());
        assert_eq!(pick.map(|t| t.id.as_str()), Some("b"));
    }

    #[test]
    fn test_equal_scores_pick_oldest() {
        let tasks = vec![task("late", 10), task("early", 1)];
        let pick = TaskSelector::new().select(&tasks, &SelectionContext::new());
        assert_eq!(pick.map(|t| t.id.as_str()), Some("early"));
    }

    #[test]
    fn test_only_ready_tasks_considered() {
        let mut doing = task("doing", 0);
        doing.status = TaskStatus::Doing;
        let tasks = vec![
            done(task("d", 0)),
            doing,
            task("blocked", 1).with_dependencies(["doing"]),
            task("ok", 2).with_dependencies(["d"]),
            task("missing", 3).with_dependencies(["nowhere"]),
        ];
        let ready: Vec<_> = TaskSelector::new()
            .ready_tasks(&tasks, &SelectionContext::new())
            .into_iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ready, vec!["ok"]);
    }

    #[test]
    fn test_excluded_and_empty_give_none() {
        let selector = TaskSelector::new();
        assert!(selector.select(&[], &SelectionContext::new()).is_none());
        let tasks = vec![task("a", 0)];
        let ctx = SelectionContext::new().excluding(["a".into()]);
        assert!(selector.select(&tasks, &ctx).is_none());
    }

    #[test]
    fn test_unblocking_outweighs_atomicity() {
        let tasks = vec![
            task("leaf", 0),
            task("root", 5),
            task("child1", 6).with_dependencies(["root"]),
            task("child2", 7).with_dependencies(["root"]),
        ];
        let selector = TaskSelector::new();
        let ctx = SelectionContext::new();
        assert_eq!(selector.score(&tasks[0], &tasks, &ctx), 50);
        assert_eq!(selector.score(&tasks[1], &tasks, &ctx), 250);
        assert_eq!(selector.select(&tasks, &ctx).unwrap().id.as_str(), "root");
    }

    #[test]
    fn test_milestone_series_and_preferred_bonuses() {
        let tasks = vec![
            done(task("m1-done-a", 0).with_tags(["m1"])),
            done(task("m1-done-b", 0).with_tags(["m1"])),
            done(task("last", 0).with_tags(["parser", "cli"])),
            task("candidate", 1).with_tags(["m1", "parser", "cli", "fast"]),
        ];
        let ctx = SelectionContext::new()
            .with_last_completed("last".into())
            .with_preferred_tags(vec!["fast".into(), "cli".into()]);
        let score = TaskSelector::new().score(&tasks[3], &tasks, &ctx);
        // atomic 50 + milestone 2*30 + series 2*25 + preferred 2*10
        assert_eq!(score, 180);
    }

    #[test]
    fn test_rank_orders_best_first() {
        let tasks = vec![task("a", 0), task("b", 1).with_tags(["next"]), task("c", 2)];
        let ranked = TaskSelector::new().rank(&tasks, &SelectionContext::new());
        let order: Vec<_> = ranked.iter().map(|s| s.task_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(ranked[0].score, 250);
    }

    #[test]
    fn test_custom_weights() {
        let mut config = SelectionConfig::default();
        config.weights.atomicity = 0;
        config.next_tag = "urgent".into();
        let selector = TaskSelector::from_config(&config);
        let tasks = vec![task("a", 0).with_tags(["urgent"])];
        assert_eq!(selector.score(&tasks[0], &tasks, &SelectionContext::new()), 200);
    }
}
