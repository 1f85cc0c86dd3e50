//! Admission-controlled priority queue of merge requests.
//!
//! Items whose dependencies have not merged yet wait at the back. Among
//! ready items a priority boost dominates, then non-deferred before
//! deferred, then oldest first. At most one item is `processing` at a time
//! since every merge writes the same integration branch.

use chrono::Utc;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::task_graph::TaskGraph;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MergeItem, MergeItemStatus, TaskId};

/// Retries after which a failed merge needs a human.
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 3;

/// Result of removing a failed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMerge {
    pub item: MergeItem,
    pub needs_escalation: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub ready: usize,
    pub waiting: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    item: MergeItem,
    seq: u64,
}

#[derive(Debug, Clone)]
pub struct MergeQueue {
    entries: Vec<Entry>,
    completed: HashSet<TaskId>,
    escalation_threshold: u32,
    next_seq: u64,
    failed: usize,
}

impl Default for MergeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            completed: HashSet::new(),
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
            next_seq: 0,
            failed: 0,
        }
    }

    pub fn with_escalation_threshold(mut self, threshold: u32) -> Self {
        self.escalation_threshold = threshold;
        self
    }

    /// Seed the completed set, e.g. with tasks merged before a restart.
    pub fn with_completed(mut self, ids: impl IntoIterator<Item = TaskId>) -> Self {
        self.completed.extend(ids);
        self
    }

    /// A queue for a restarted process. A task is only `done` once its merge
    /// has landed, so every done task counts as merged.
    pub fn resuming(graph: &TaskGraph) -> Self {
        Self::new().with_completed(graph.completed_ids())
    }

    fn gate(&self, item: &MergeItem) -> MergeItemStatus {
        if item.dependencies.iter().all(|d| self.completed.contains(d)) {
            MergeItemStatus::Ready
        } else {
            MergeItemStatus::WaitingDependency
        }
    }

    fn resort(&mut self) {
        self.entries.sort_by_key(|e| {
            let item = &e.item;
            (
                item.status.rank(),
                Reverse(item.priority_boost()),
                item.is_deferred(),
                item.deferred_at,
                item.enqueued_at,
                e.seq,
            )
        });
    }

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.entries.iter().position(|e| &e.item.task_id == id)
    }

    /// Admit an item; its status is derived from the dependency gate.
    pub fn enqueue(&mut self, mut item: MergeItem) -> DomainResult<MergeItemStatus> {
        if self.position(&item.task_id).is_some() {
            return Err(DomainError::ValidationFailed(format!(
                "merge for {} is already queued",
                item.task_id
            )));
        }
        item.status = self.gate(&item);
        let status = item.status;
        info!(task_id = %item.task_id, status = ?status, priority = item.priority, "merge enqueued");
        self.entries.push(Entry {
            item,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        self.resort();
        Ok(status)
    }

    /// Hand out the best ready item and mark it processing. `None` when
    /// nothing is ready or another item is still processing.
    pub fn dequeue(&mut self) -> Option<MergeItem> {
        if self.processing().is_some() {
            return None;
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.item.status == MergeItemStatus::Ready)?;
        entry.item.status = MergeItemStatus::Processing;
        let item = entry.item.clone();
        self.resort();
        debug!(task_id = %item.task_id, "merge dequeued");
        Some(item)
    }

    /// Remove the item, record its task as merged and promote any waiting
    /// items that are now unblocked. Returns whether an item was removed.
    pub fn mark_completed(&mut self, id: &TaskId) -> bool {
        let removed = self.position(id).map(|i| self.entries.remove(i)).is_some();
        self.completed.insert(id.clone());

        let mut promoted = 0usize;
        for i in 0..self.entries.len() {
            if self.entries[i].item.status == MergeItemStatus::WaitingDependency
                && self.gate(&self.entries[i].item) == MergeItemStatus::Ready
            {
                self.entries[i].item.status = MergeItemStatus::Ready;
                promoted += 1;
            }
        }
        self.resort();
        info!(task_id = %id, promoted, "merge completed");
        removed
    }

    /// Drop the item for good and report whether it has exhausted its retries.
    pub fn mark_failed(&mut self, id: &TaskId) -> Option<FailedMerge> {
        let i = self.position(id)?;
        let entry = self.entries.remove(i);
        self.failed += 1;
        let needs_escalation = entry.item.retry_count >= self.escalation_threshold;
        warn!(
            task_id = %id,
            retry_count = entry.item.retry_count,
            needs_escalation,
            "merge failed"
        );
        Some(FailedMerge {
            item: entry.item,
            needs_escalation,
        })
    }

    /// Put the item back behind fresh work of equal priority; returns the
    /// new retry count.
    pub fn defer_to_end(&mut self, id: &TaskId) -> DomainResult<u32> {
        let i = self
            .position(id)
            .ok_or_else(|| DomainError::MergeItemNotFound(id.clone()))?;
        let status = self.gate(&self.entries[i].item);
        let item = &mut self.entries[i].item;
        item.retry_count += 1;
        item.deferred_at = Some(Utc::now());
        item.status = status;
        let retry_count = item.retry_count;
        self.resort();
        info!(task_id = %id, retry_count, "merge deferred to end of queue");
        Ok(retry_count)
    }

    pub fn escalation_threshold(&self) -> u32 {
        self.escalation_threshold
    }

    pub fn processing(&self) -> Option<&MergeItem> {
        self.entries
            .iter()
            .map(|e| &e.item)
            .find(|i| i.status == MergeItemStatus::Processing)
    }

    pub fn get(&self, id: &TaskId) -> Option<&MergeItem> {
        self.position(id).map(|i| &self.entries[i].item)
    }

    /// Items in queue order.
    pub fn items(&self) -> impl Iterator<Item = &MergeItem> {
        self.entries.iter().map(|e| &e.item)
    }

    pub fn is_completed(&self, id: &TaskId) -> bool {
        self.completed.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            completed: self.completed.len(),
            failed: self.failed,
            ..QueueStats::default()
        };
        for item in self.items() {
            match item.status {
                MergeItemStatus::Ready => stats.ready += 1,
                MergeItemStatus::WaitingDependency => stats.waiting += 1,
                MergeItemStatus::Processing => stats.processing += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(id: &str, priority: u8, minutes: i64) -> MergeItem {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes);
        MergeItem::new(id, format!("task/{id}"), format!("/wt/{id}"))
            .with_priority(priority)
            .with_enqueued_at(at)
    }

    fn order(queue: &MergeQueue) -> Vec<&str> {
        queue.items().map(|i| i.task_id.as_str()).collect()
    }

    #[test]
    fn test_dependency_gate_and_promotion() {
        let mut queue = MergeQueue::new();
        let status = queue
            .enqueue(item("b", 2, 0).with_dependencies(["a".into()]))
            .unwrap();
        assert_eq!(status, MergeItemStatus::WaitingDependency);
        assert!(queue.dequeue().is_none());

        assert!(!queue.mark_completed(&"a".into()));
        assert_eq!(queue.get(&"b".into()).unwrap().status, MergeItemStatus::Ready);
        assert_eq!(queue.dequeue().unwrap().task_id.as_str(), "b");
    }

    #[test]
    fn test_seeded_completed_set_admits_ready() {
        let mut queue = MergeQueue::new().with_completed(["a".into()]);
        let status = queue
            .enqueue(item("b", 2, 0).with_dependencies(["a".into()]))
            .unwrap();
        assert_eq!(status, MergeItemStatus::Ready);
    }

    #[test]
    fn test_resuming_counts_done_tasks_as_merged() {
        use crate::adapters::jsonl::MemoryTaskLog;
        use std::sync::Arc;

        let mut graph = TaskGraph::new(Arc::new(MemoryTaskLog::new()), "ch");
        let merged = graph.create("merged", vec![], vec![]).unwrap();
        let pending = graph.create("pending", vec![], vec![]).unwrap();
        graph.claim(&merged).unwrap();
        graph.complete(&merged).unwrap();

        let mut queue = MergeQueue::resuming(&graph);
        let status = queue
            .enqueue(item("ch-3", 2, 0).with_dependencies([merged]))
            .unwrap();
        assert_eq!(status, MergeItemStatus::Ready);
        let status = queue
            .enqueue(item("ch-4", 2, 1).with_dependencies([pending]))
            .unwrap();
        assert_eq!(status, MergeItemStatus::WaitingDependency);
    }

    #[test]
    fn test_priority_dominates_age() {
        let mut queue = MergeQueue::new();
        queue.enqueue(item("old-low", 4, 0)).unwrap();
        queue.enqueue(item("new-high", 0, 10)).unwrap();
        queue.enqueue(item("mid", 2, 5)).unwrap();
        assert_eq!(order(&queue), vec!["new-high", "mid", "old-low"]);
    }

    #[test]
    fn test_age_breaks_priority_ties() {
        let mut queue = MergeQueue::new();
        queue.enqueue(item("younger", 2, 9)).unwrap();
        queue.enqueue(item("older", 2, 1)).unwrap();
        assert_eq!(queue.dequeue().unwrap().task_id.as_str(), "older");
    }

    #[test]
    fn test_single_processing_item() {
        let mut queue = MergeQueue::new();
        queue.enqueue(item("a", 2, 0)).unwrap();
        queue.enqueue(item("b", 2, 1)).unwrap();
        assert_eq!(queue.dequeue().unwrap().task_id.as_str(), "a");
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.stats().processing, 1);

        queue.mark_completed(&"a".into());
        assert_eq!(queue.dequeue().unwrap().task_id.as_str(), "b");
    }

    #[test]
    fn test_waiting_sorts_after_ready() {
        let mut queue = MergeQueue::new();
        queue
            .enqueue(item("gated", 0, 0).with_dependencies(["x".into()]))
            .unwrap();
        queue.enqueue(item("free", 4, 5)).unwrap();
        assert_eq!(order(&queue), vec!["free", "gated"]);
    }

    #[test]
    fn test_defer_moves_behind_equal_priority() {
        let mut queue = MergeQueue::new();
        queue.enqueue(item("a", 2, 0)).unwrap();
        queue.enqueue(item("b", 2, 1)).unwrap();
        let first = queue.dequeue().unwrap();
        assert_eq!(queue.defer_to_end(&first.task_id).unwrap(), 1);

        let again = queue.get(&"a".into()).unwrap();
        assert_eq!(again.status, MergeItemStatus::Ready);
        assert!(again.deferred_at.is_some());
        assert_eq!(order(&queue), vec!["b", "a"]);
    }

    #[test]
    fn test_deferred_still_beats_lower_priority() {
        let mut queue = MergeQueue::new();
        queue.enqueue(item("hi", 1, 0)).unwrap();
        queue.enqueue(item("lo", 3, 1)).unwrap();
        queue.defer_to_end(&"hi".into()).unwrap();
        assert_eq!(order(&queue), vec!["hi", "lo"]);
    }

    #[test]
    fn test_mark_failed_escalation_threshold() {
        let mut queue = MergeQueue::new();
        queue.enqueue(item("a", 2, 0)).unwrap();
        for _ in 0..2 {
            queue.defer_to_end(&"a".into()).unwrap();
        }
        let failed = queue.mark_failed(&"a".into()).unwrap();
        assert!(!failed.needs_escalation);

        queue.enqueue(item("b", 2, 0)).unwrap();
        for _ in 0..3 {
            queue.defer_to_end(&"b".into()).unwrap();
        }
        assert!(queue.mark_failed(&"b".into()).unwrap().needs_escalation);
        assert!(queue.mark_failed(&"b".into()).is_none());
        assert_eq!(queue.stats().failed, 2);
    }

    #[test]
    fn test_duplicate_enqueue_rejected() {
        let mut queue = MergeQueue::new();
        queue.enqueue(item("a", 2, 0)).unwrap();
        assert!(queue.enqueue(item("a", 1, 3)).is_err());
        assert!(matches!(
            queue.defer_to_end(&"zzz".into()),
            Err(DomainError::MergeItemNotFound(_))
        ));
    }
}
