//! Fixed pool of worker slots.

use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{SlotId, TaskId};

/// Tracks which task occupies each slot. A task holds at most one slot and a
/// slot holds at most one task.
#[derive(Debug, Clone)]
pub struct SlotManager {
    slots: Vec<Option<TaskId>>,
}

impl SlotManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn available(&self) -> usize {
        self.capacity() - self.in_use()
    }

    pub fn has_available(&self) -> bool {
        self.slots.iter().any(Option::is_none)
    }

    /// Claim the lowest free slot for `task`. `None` when the pool is full.
    pub fn acquire(&mut self, task: &TaskId) -> DomainResult<Option<SlotId>> {
        if self.slot_of(task).is_some() {
            return Err(DomainError::ValidationFailed(format!(
                "task {task} already holds a slot"
            )));
        }
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return Ok(None);
        };
        self.slots[index] = Some(task.clone());
        debug!(slot = index, task_id = %task, "slot acquired");
        Ok(Some(SlotId(index)))
    }

    /// Free a slot, returning the task that held it.
    pub fn release(&mut self, slot: SlotId) -> Option<TaskId> {
        let task = self.slots.get_mut(slot.0).and_then(Option::take);
        if let Some(task) = &task {
            debug!(slot = slot.0, task_id = %task, "slot released");
        }
        task
    }

    /// Free whichever slot `task` holds.
    pub fn release_task(&mut self, task: &TaskId) -> Option<SlotId> {
        let slot = self.slot_of(task)?;
        self.release(slot);
        Some(slot)
    }

    pub fn slot_of(&self, task: &TaskId) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|s| s.as_ref() == Some(task))
            .map(SlotId)
    }

    pub fn occupant(&self, slot: SlotId) -> Option<&TaskId> {
        self.slots.get(slot.0).and_then(Option::as_ref)
    }

    /// Tasks currently holding a slot, in slot order.
    pub fn active_tasks(&self) -> impl Iterator<Item = (SlotId, &TaskId)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|t| (SlotId(i), t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_full() {
        let mut slots = SlotManager::new(2);
        assert_eq!(slots.acquire(&"a".into()).unwrap(), Some(SlotId(0)));
        assert_eq!(slots.acquire(&"b".into()).unwrap(), Some(SlotId(1)));
        assert_eq!(slots.acquire(&"c".into()).unwrap(), None);
        assert_eq!(slots.in_use(), 2);
        assert!(!slots.has_available());
    }

    #[test]
    fn test_release_frees_for_reuse() {
        let mut slots = SlotManager::new(2);
        let a = slots.acquire(&"a".into()).unwrap().unwrap();
        slots.acquire(&"b".into()).unwrap();
        assert_eq!(slots.release(a), Some(TaskId::from("a")));
        assert_eq!(slots.release(a), None);
        assert_eq!(slots.available(), 1);
        assert_eq!(slots.acquire(&"c".into()).unwrap(), Some(a));
    }

    #[test]
    fn test_task_holds_one_slot() {
        let mut slots = SlotManager::new(3);
        slots.acquire(&"a".into()).unwrap();
        assert!(slots.acquire(&"a".into()).is_err());
    }

    #[test]
    fn test_release_by_task() {
        let mut slots = SlotManager::new(2);
        slots.acquire(&"a".into()).unwrap();
        slots.acquire(&"b".into()).unwrap();
        assert_eq!(slots.release_task(&"b".into()), Some(SlotId(1)));
        assert_eq!(slots.release_task(&"b".into()), None);
        assert_eq!(slots.occupant(SlotId(0)), Some(&TaskId::from("a")));
        assert_eq!(slots.active_tasks().count(), 1);
    }

    #[test]
    fn test_zero_capacity() {
        let mut slots = SlotManager::new(0);
        assert_eq!(slots.acquire(&"a".into()).unwrap(), None);
        assert_eq!(slots.available(), 0);
    }
}
