//! Task graph: sole owner of task records.
//!
//! Every mutation writes a full snapshot of the task to the [`TaskLog`]
//! before it is applied in memory, so replaying the log reproduces the graph.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::dependency_checker::{DependencyChecker, DependencyReport};
use super::event_bus::{CoreEvent, EventBus};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskId, TaskStatus};
use crate::domain::ports::{LogRecord, TaskLog};

pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    log: Arc<dyn TaskLog>,
    prefix: String,
    next_sequence: u64,
    events: Option<EventBus>,
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.tasks.len())
            .field("prefix", &self.prefix)
            .field("next_sequence", &self.next_sequence)
            .finish_non_exhaustive()
    }
}

impl TaskGraph {
    pub fn new(log: Arc<dyn TaskLog>, prefix: impl Into<String>) -> Self {
        Self {
            tasks: Vec::new(),
            index: HashMap::new(),
            log,
            prefix: prefix.into(),
            next_sequence: 1,
            events: None,
        }
    }

    /// Rebuild the graph by replaying every task snapshot in the log.
    pub fn load(log: Arc<dyn TaskLog>, prefix: impl Into<String>) -> DomainResult<Self> {
        let mut graph = Self::new(log, prefix);
        let records = graph.log.replay()?;
        let mut snapshots = 0usize;

        for record in records {
            if let LogRecord::Task(task) = record {
                snapshots += 1;
                graph.put(task);
            }
        }

        let prefix_dash = format!("{}-", graph.prefix);
        graph.next_sequence = graph
            .tasks
            .iter()
            .filter(|t| t.id.as_str().starts_with(&prefix_dash))
            .filter_map(|t| t.id.sequence())
            .max()
            .map_or(1, |n| n + 1);

        info!(
            tasks = graph.tasks.len(),
            snapshots,
            next_sequence = graph.next_sequence,
            "task graph replayed"
        );
        Ok(graph)
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn put(&mut self, task: Task) {
        if let Some(&slot) = self.index.get(&task.id) {
            self.tasks[slot] = task;
        } else {
            self.index.insert(task.id.clone(), self.tasks.len());
            self.tasks.push(task);
        }
    }

    fn persist(&mut self, task: Task) -> DomainResult<()> {
        self.log.append(&LogRecord::Task(task.clone()))?;
        let (task_id, status) = (task.id.clone(), task.status);
        self.put(task);
        if let Some(events) = &self.events {
            events.publish(CoreEvent::TaskChanged { task_id, status });
        }
        Ok(())
    }

    /// Mint the next sequential id without creating a task.
    pub fn next_id(&mut self) -> TaskId {
        let id = TaskId::sequential(&self.prefix, self.next_sequence);
        self.next_sequence += 1;
        id
    }

    /// Create a task with a freshly minted id.
    pub fn create(
        &mut self,
        title: impl Into<String>,
        dependencies: Vec<TaskId>,
        tags: Vec<String>,
    ) -> DomainResult<TaskId> {
        let id = self.next_id();
        let task = Task::new(id.clone(), title)
            .with_dependencies(dependencies)
            .with_tags(tags);
        self.insert(task)?;
        Ok(id)
    }

    /// Insert a fully built task. Dependencies are not validated here; use
    /// [`TaskGraph::check`] for that.
    pub fn insert(&mut self, task: Task) -> DomainResult<()> {
        if self.index.contains_key(&task.id) {
            return Err(DomainError::ValidationFailed(format!(
                "task {} already exists",
                task.id
            )));
        }
        if let Some(n) = task.id.sequence() {
            if task.id.as_str().starts_with(&format!("{}-", self.prefix)) {
                self.next_sequence = self.next_sequence.max(n + 1);
            }
        }
        debug!(task_id = %task.id, "task created");
        self.persist(task)
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    fn cloned(&self, id: &TaskId) -> DomainResult<Task> {
        self.get(id)
            .cloned()
            .ok_or_else(|| DomainError::TaskNotFound(id.clone()))
    }

    /// All tasks in creation order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn with_status(&self, status: TaskStatus) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.status == status)
    }

    pub fn completed_ids(&self) -> HashSet<TaskId> {
        self.with_status(TaskStatus::Done)
            .map(|t| t.id.clone())
            .collect()
    }

    /// True when no task is left in `todo` or `doing`.
    pub fn is_settled(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    /// `todo -> doing`
    pub fn claim(&mut self, id: &TaskId) -> DomainResult<()> {
        let mut task = self.cloned(id)?;
        task.transition_to(TaskStatus::Doing)?;
        info!(task_id = %id, "task claimed");
        self.persist(task)
    }

    /// `doing -> done`
    pub fn complete(&mut self, id: &TaskId) -> DomainResult<()> {
        let mut task = self.cloned(id)?;
        task.transition_to(TaskStatus::Done)?;
        info!(task_id = %id, iterations = task.execution.iterations, "task completed");
        self.persist(task)
    }

    /// `doing -> failed`, keeping the error for postmortem.
    pub fn fail(&mut self, id: &TaskId, error: impl Into<String>) -> DomainResult<()> {
        let mut task = self.cloned(id)?;
        task.transition_to(TaskStatus::Failed)?;
        let error = error.into();
        warn!(task_id = %id, error = %error, "task failed");
        task.execution.last_error = Some(error);
        self.persist(task)
    }

    /// Count one agent iteration; returns the new total.
    pub fn record_iteration(&mut self, id: &TaskId) -> DomainResult<u32> {
        let mut task = self.cloned(id)?;
        task.execution.iterations += 1;
        let iterations = task.execution.iterations;
        self.persist(task)?;
        Ok(iterations)
    }

    /// Remember where a task's worker is operating.
    pub fn set_workspace(&mut self, id: &TaskId, worktree: PathBuf, branch: String) -> DomainResult<()> {
        let mut task = self.cloned(id)?;
        task.execution.worktree = Some(worktree);
        task.execution.branch = Some(branch);
        self.persist(task)
    }

    /// `doing -> todo` with retry accounting. Only crash recovery may call
    /// this; returns the retry count before the reset.
    pub(crate) fn reset_orphan(&mut self, id: &TaskId) -> DomainResult<u32> {
        let mut task = self.cloned(id)?;
        if task.status != TaskStatus::Doing {
            return Err(DomainError::InvalidStateTransition {
                task_id: id.clone(),
                from: task.status,
                to: TaskStatus::Todo,
            });
        }
        let previous = task.execution.retry_count;
        task.status = TaskStatus::Todo;
        task.execution.retry_count += 1;
        task.execution.started_at = None;
        task.updated_at = chrono::Utc::now();
        self.persist(task)?;
        Ok(previous)
    }

    pub fn check(&self) -> DependencyReport {
        DependencyChecker::new().check(&self.tasks)
    }

    pub fn topological_sort(&self) -> Vec<TaskId> {
        DependencyChecker::new().topological_sort(&self.tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::jsonl::MemoryTaskLog;

    fn graph() -> TaskGraph {
        TaskGraph::new(Arc::new(MemoryTaskLog::new()), "ch")
    }

    #[test]
    fn test_create_mints_sequential_ids() {
        let mut g = graph();
        let a = g.create("first", vec![], vec![]).unwrap();
        let b = g.create("second", vec![a.clone()], vec!["m1".into()]).unwrap();
        assert_eq!(a.as_str(), "ch-1");
        assert_eq!(b.as_str(), "ch-2");
        assert_eq!(g.get(&b).unwrap().dependencies, vec![a]);
    }

    #[test]
    fn test_lifecycle_is_monotonic() {
        let mut g = graph();
        let id = g.create("x", vec![], vec![]).unwrap();
        assert!(g.complete(&id).is_err());
        g.claim(&id).unwrap();
        assert!(g.claim(&id).is_err());
        g.complete(&id).unwrap();
        assert!(g.fail(&id, "late").is_err());
        assert_eq!(g.get(&id).unwrap().status, TaskStatus::Done);
        assert!(g.completed_ids().contains(&id));
    }

    #[test]
    fn test_fail_records_error() {
        let mut g = graph();
        let id = g.create("x", vec![], vec![]).unwrap();
        g.claim(&id).unwrap();
        g.fail(&id, "agent exited 1").unwrap();
        let task = g.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.execution.last_error.as_deref(), Some("agent exited 1"));
    }

    #[test]
    fn test_unknown_task() {
        let mut g = graph();
        let err = g.claim(&"ch-404".into()).unwrap_err();
        assert!(matches!(err, DomainError::TaskNotFound(_)));
    }

    #[test]
    fn test_reset_orphan_only_from_doing() {
        let mut g = graph();
        let id = g.create("x", vec![], vec![]).unwrap();
        assert!(g.reset_orphan(&id).is_err());
        g.claim(&id).unwrap();
        assert_eq!(g.reset_orphan(&id).unwrap(), 0);
        let task = g.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.execution.retry_count, 1);
    }

    #[test]
    fn test_replay_restores_state_and_sequence() {
        let log: Arc<dyn TaskLog> = Arc::new(MemoryTaskLog::new());
        {
            let mut g = TaskGraph::new(Arc::clone(&log), "ch");
            let a = g.create("a", vec![], vec![]).unwrap();
            g.create("b", vec![a.clone()], vec![]).unwrap();
            g.claim(&a).unwrap();
            g.record_iteration(&a).unwrap();
        }
        let mut g = TaskGraph::load(log, "ch").unwrap();
        assert_eq!(g.len(), 2);
        let a = g.get(&"ch-1".into()).unwrap();
        assert_eq!(a.status, TaskStatus::Doing);
        assert_eq!(a.execution.iterations, 1);
        assert_eq!(g.next_id().as_str(), "ch-3");
    }

    #[test]
    fn test_mutations_publish_changes() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut g = graph().with_event_bus(bus);
        let id = g.create("x", vec![], vec![]).unwrap();
        g.claim(&id).unwrap();

        let statuses: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event)
            .collect();
        assert_eq!(
            statuses,
            vec![
                CoreEvent::TaskChanged { task_id: id.clone(), status: TaskStatus::Todo },
                CoreEvent::TaskChanged { task_id: id, status: TaskStatus::Doing },
            ]
        );
    }

    #[test]
    fn test_check_and_sort_delegate() {
        let mut g = graph();
        let a = g.create("a", vec![], vec![]).unwrap();
        let b = g.create("b", vec![a.clone(), "ch-99".into()], vec![]).unwrap();
        assert_eq!(g.check().missing().count(), 1);
        assert_eq!(g.topological_sort(), vec![a, b]);
    }
}
