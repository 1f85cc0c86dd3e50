//! Change notification for the orchestration core.
//!
//! Every published event gets a monotonically increasing sequence number and
//! is pushed to each live subscriber's unbounded channel before `publish`
//! returns, so delivery is synchronous with the mutation that triggered it.
//! Subscribers see events in publish order, at least once. A subscriber whose
//! receiver was dropped is pruned on the next publish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::domain::models::{ConflictTier, LoopPhase, SlotId, TaskId, TaskStatus};

/// Monotonically increasing sequence number assigned by [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the core announces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CoreEvent {
    TaskChanged { task_id: TaskId, status: TaskStatus },
    TaskRecovered { task_id: TaskId, retry_count: u32 },
    SlotAcquired { slot: SlotId, task_id: TaskId },
    SlotReleased { slot: SlotId, task_id: TaskId },
    LoopPhaseChanged { phase: LoopPhase },
    ErrorThreshold { consecutive_errors: u32 },
    AgentStuck { task_id: TaskId, iterations: u32 },
    AllDone,
    MergeEnqueued { task_id: TaskId },
    MergeCompleted { task_id: TaskId },
    MergeDeferred { task_id: TaskId, retry_count: u32 },
    MergeFailed { task_id: TaskId, needs_escalation: bool },
    ConflictClassified { task_id: TaskId, tier: ConflictTier },
    Escalated { task_id: TaskId },
}

/// Sequenced event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub event: CoreEvent,
}

#[derive(Debug, Default)]
struct Inner {
    sequence: AtomicU64,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<EventEnvelope>>>,
}

/// Cheap to clone; all clones share subscribers and the sequence counter.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: CoreEvent) -> SequenceNumber {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Sequence is taken under the lock so delivery order matches numbering.
        let sequence = SequenceNumber(self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1);
        let envelope = EventEnvelope {
            sequence,
            timestamp: Utc::now(),
            event,
        };
        subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
        sequence
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EventEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.inner.sequence.load(Ordering::SeqCst))
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
