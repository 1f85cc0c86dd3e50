//! Dependency validation and ordering for the task graph.
//!
//! Problems are returned as data in a [`DependencyReport`] so the planning
//! stage can decide whether to block or carry on with warnings.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::domain::models::{Task, TaskId};

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[TaskId]) -> String {
    path.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A single problem found in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyError {
    #[error("Circular dependency: {}", format_cycle_path(.path))]
    Circular {
        task_id: TaskId,
        /// Starts and ends at `task_id`
        path: Vec<TaskId>,
    },

    #[error("Task {task_id} depends on missing task {missing}")]
    Missing { task_id: TaskId, missing: TaskId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub errors: Vec<DependencyError>,
}

impl DependencyReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn circular(&self) -> impl Iterator<Item = &DependencyError> {
        self.errors
            .iter()
            .filter(|e| matches!(e, DependencyError::Circular { .. }))
    }

    pub fn missing(&self) -> impl Iterator<Item = &DependencyError> {
        self.errors
            .iter()
            .filter(|e| matches!(e, DependencyError::Missing { .. }))
    }
}

/// Edge lookups are rebuilt from scratch on every `check` or
/// `topological_sort` call.
#[derive(Debug, Clone, Default)]
pub struct DependencyChecker {
    order: Vec<TaskId>,
    blockers: HashMap<TaskId, Vec<TaskId>>,
    dependents: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    fn build(&mut self, tasks: &[Task]) {
        self.order.clear();
        self.blockers.clear();
        self.dependents.clear();

        for task in tasks {
            if !self.blockers.contains_key(&task.id) {
                self.order.push(task.id.clone());
            }
            self.blockers
                .insert(task.id.clone(), task.dependencies.clone());
            for dep in &task.dependencies {
                self.dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(task.id.clone());
            }
        }
    }

    fn is_known(&self, id: &TaskId) -> bool {
        self.blockers.contains_key(id)
    }

    /// Validate the whole task set, reporting every missing reference and
    /// every cycle the depth-first walk runs into.
    pub fn check(&mut self, tasks: &[Task]) -> DependencyReport {
        self.build(tasks);
        let mut report = DependencyReport::default();

        for id in &self.order {
            for dep in self.blockers.get(id).into_iter().flatten() {
                if !self.is_known(dep) {
                    report.errors.push(DependencyError::Missing {
                        task_id: id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        for id in &self.order {
            if !visited.contains(id) {
                self.find_cycles(id, &mut visiting, &mut visited, &mut path, &mut report.errors);
            }
        }

        report
    }

    fn find_cycles(
        &self,
        id: &TaskId,
        visiting: &mut HashSet<TaskId>,
        visited: &mut HashSet<TaskId>,
        path: &mut Vec<TaskId>,
        errors: &mut Vec<DependencyError>,
    ) {
        visiting.insert(id.clone());
        path.push(id.clone());

        for dep in self.blockers.get(id).into_iter().flatten() {
            if !self.is_known(dep) {
                continue;
            }
            if visiting.contains(dep) {
                if let Some(start) = path.iter().position(|p| p == dep) {
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep.clone());
                    errors.push(DependencyError::Circular {
                        task_id: dep.clone(),
                        path: cycle,
                    });
                }
            } else if !visited.contains(dep) {
                self.find_cycles(dep, visiting, visited, path, errors);
            }
        }

        path.pop();
        visiting.remove(id);
        visited.insert(id.clone());
    }

    /// Dependencies-first ordering of every task id. A task already on the
    /// current recursion path is skipped, so cycles never stop the sort.
    pub fn topological_sort(&mut self, tasks: &[Task]) -> Vec<TaskId> {
        self.build(tasks);
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        let mut sorted = Vec::with_capacity(self.order.len());

        for id in &self.order {
            self.sort_visit(id, &mut visiting, &mut visited, &mut sorted);
        }
        sorted
    }

    fn sort_visit(
        &self,
        id: &TaskId,
        visiting: &mut HashSet<TaskId>,
        visited: &mut HashSet<TaskId>,
        sorted: &mut Vec<TaskId>,
    ) {
        if visited.contains(id) || visiting.contains(id) {
            return;
        }
        visiting.insert(id.clone());
        for dep in self.blockers.get(id).into_iter().flatten() {
            if self.is_known(dep) {
                self.sort_visit(dep, visiting, visited, sorted);
            }
        }
        visiting.remove(id);
        visited.insert(id.clone());
        sorted.push(id.clone());
    }

    /// True iff every dependency of `id` is in `completed`. Uses the edges
    /// from the most recent `check` or `topological_sort`.
    pub fn can_start(&self, id: &TaskId, completed: &HashSet<TaskId>) -> bool {
        self.blockers(id).iter().all(|dep| completed.contains(dep))
    }

    /// Tasks that depend on `id`.
    pub fn dependents(&self, id: &TaskId) -> &[TaskId] {
        self.dependents.get(id).map_or(&[], Vec::as_slice)
    }

    /// Tasks `id` depends on.
    pub fn blockers(&self, id: &TaskId) -> &[TaskId] {
        self.blockers.get(id).map_or(&[], Vec::as_slice)
    }
}

/// Stateless form of [`DependencyChecker::can_start`] for a task in hand.
pub fn can_start(task: &Task, completed: &HashSet<TaskId>) -> bool {
    task.dependencies.iter().all(|dep| completed.contains(dep))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(id, id).with_dependencies(deps.iter().copied())
    }

    fn ids(list: &[&str]) -> Vec<TaskId> {
        list.iter().copied().map(TaskId::from).collect()
    }

    #[test]
    fn test_valid_graph_has_no_errors() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["a", "b"])];
        let report = DependencyChecker::new().check(&tasks);
        assert!(report.is_valid());
    }

    #[test]
    fn test_missing_dependency_reported() {
        let tasks = vec![task("a", &["ghost"]), task("b", &["a", "phantom"])];
        let report = DependencyChecker::new().check(&tasks);
        let missing: Vec<_> = report.missing().collect();
        assert_eq!(missing.len(), 2);
        assert_eq!(
            missing[0],
            &DependencyError::Missing {
                task_id: "a".into(),
                missing: "ghost".into()
            }
        );
    }

    #[test]
    fn test_cycle_path_starts_and_ends_at_same_id() {
        let tasks = vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])];
        let report = DependencyChecker::new().check(&tasks);
        let cycles: Vec<_> = report.circular().collect();
        assert_eq!(cycles.len(), 1);
        match cycles[0] {
            DependencyError::Circular { task_id, path } => {
                assert_eq!(path.first(), Some(task_id));
                assert_eq!(path.last(), Some(task_id));
                assert_eq!(path, &ids(&["a", "c", "b", "a"]));
            }
            DependencyError::Missing { .. } => panic!("expected a cycle"),
        }
        assert_eq!(cycles[0].to_string(), "Circular dependency: a -> c -> b -> a");
    }

    #[test]
    fn test_every_cycle_is_reported() {
        let tasks = vec![
            task("a", &["b"]),
            task("b", &["a"]),
            task("c", &["d"]),
            task("d", &["c"]),
        ];
        let report = DependencyChecker::new().check(&tasks);
        assert_eq!(report.circular().count(), 2);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let report = DependencyChecker::new().check(&[task("a", &["a"])]);
        assert_eq!(
            report.errors,
            vec![DependencyError::Circular {
                task_id: "a".into(),
                path: ids(&["a", "a"])
            }]
        );
    }

    #[test]
    fn test_topological_sort_puts_dependencies_first() {
        let tasks = vec![task("c", &["b"]), task("b", &["a"]), task("a", &[])];
        let sorted = DependencyChecker::new().topological_sort(&tasks);
        assert_eq!(sorted, ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_topological_sort_terminates_on_cycle() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"]), task("c", &["a"])];
        let sorted = DependencyChecker::new().topological_sort(&tasks);
        assert_eq!(sorted.len(), 3);
        let unique: HashSet<_> = sorted.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_edge_lookups() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["a"])];
        let mut checker = DependencyChecker::new();
        checker.check(&tasks);
        assert_eq!(checker.dependents(&"a".into()), ids(&["b", "c"]).as_slice());
        assert_eq!(checker.blockers(&"b".into()), ids(&["a"]).as_slice());
        assert!(checker.blockers(&"zzz".into()).is_empty());

        let mut completed = HashSet::new();
        assert!(!checker.can_start(&"b".into(), &completed));
        completed.insert(TaskId::from("a"));
        assert!(checker.can_start(&"b".into(), &completed));
    }

    #[test]
    fn test_free_can_start() {
        let t = task("x", &["p", "q"]);
        let mut completed: HashSet<TaskId> = ids(&["p"]).into_iter().collect();
        assert!(!can_start(&t, &completed));
        completed.insert("q".into());
        assert!(can_start(&t, &completed));
    }
}
