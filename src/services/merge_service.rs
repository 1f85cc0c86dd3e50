//! Single consumer of the merge queue.
//!
//! Dequeues one item at a time, merges it, and walks the resolution ladder
//! on conflict. Runs as its own task; producers talk to it through a
//! cloneable [`MergeHandle`] and results flow back as [`MergeOutcome`]s.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use super::audit_trail::AuditTrail;
use super::event_bus::{CoreEvent, EventBus};
use super::merge_queue::{MergeQueue, QueueStats};
use super::resolution_ladder::{LadderOutcome, ResolutionLadder};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AuditEntry, AuditEntryType, MergeItem, MergeItemStatus, ResolutionStrategy, TaskId,
};
use crate::domain::ports::{HumanAction, MergeResult, MergeWorker, WorktreeManager};

/// What happened to one dequeued item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged {
        task_id: TaskId,
    },
    /// Sent to the back of the queue for another attempt
    Deferred {
        task_id: TaskId,
        retry_count: u32,
    },
    /// Removed from the queue for good
    Failed {
        task_id: TaskId,
        needs_escalation: bool,
        reason: String,
    },
}

impl MergeOutcome {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Merged { task_id } | Self::Deferred { task_id, .. } | Self::Failed { task_id, .. } => {
                task_id
            }
        }
    }
}

#[derive(Debug)]
pub(crate) enum MergeCommand {
    Enqueue(MergeItem),
    Stats(oneshot::Sender<QueueStats>),
    Stop,
}

/// Cloneable producer side of a running [`MergeService`].
#[derive(Debug, Clone)]
pub struct MergeHandle {
    tx: mpsc::UnboundedSender<MergeCommand>,
}

impl MergeHandle {
    #[cfg(test)]
    pub(crate) fn for_channel(tx: mpsc::UnboundedSender<MergeCommand>) -> Self {
        Self { tx }
    }

    pub fn enqueue(&self, item: MergeItem) -> DomainResult<()> {
        self.tx
            .send(MergeCommand::Enqueue(item))
            .map_err(|_| DomainError::ChannelClosed("merge service"))
    }

    pub async fn stats(&self) -> DomainResult<QueueStats> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(MergeCommand::Stats(tx))
            .map_err(|_| DomainError::ChannelClosed("merge service"))?;
        rx.await
            .map_err(|_| DomainError::ChannelClosed("merge service"))
    }

    /// Ask the service to stop after the item in flight, if any.
    pub fn stop(&self) {
        let _ = self.tx.send(MergeCommand::Stop);
    }
}

pub struct MergeService {
    queue: MergeQueue,
    worker: Arc<dyn MergeWorker>,
    ladder: ResolutionLadder,
    worktrees: Arc<dyn WorktreeManager>,
    audit: Option<AuditTrail>,
    events: Option<EventBus>,
    outcomes: Option<mpsc::UnboundedSender<MergeOutcome>>,
    poll_interval: Duration,
    commands: mpsc::UnboundedReceiver<MergeCommand>,
    handle: MergeHandle,
}

impl MergeService {
    pub fn new(
        queue: MergeQueue,
        worker: Arc<dyn MergeWorker>,
        ladder: ResolutionLadder,
        worktrees: Arc<dyn WorktreeManager>,
    ) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        Self {
            queue,
            worker,
            ladder,
            worktrees,
            audit: None,
            events: None,
            outcomes: None,
            poll_interval: Duration::from_millis(10),
            commands,
            handle: MergeHandle { tx },
        }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Where to report each item's outcome (normally the orchestration loop).
    pub fn with_outcomes(mut self, outcomes: mpsc::UnboundedSender<MergeOutcome>) -> Self {
        self.outcomes = Some(outcomes);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn handle(&self) -> MergeHandle {
        self.handle.clone()
    }

    pub fn queue(&self) -> &MergeQueue {
        &self.queue
    }

    pub fn enqueue(&mut self, item: MergeItem) -> DomainResult<MergeItemStatus> {
        let task_id = item.task_id.clone();
        let status = self.queue.enqueue(item)?;
        self.publish(CoreEvent::MergeEnqueued { task_id });
        Ok(status)
    }

    fn publish(&self, event: CoreEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    fn audit(&self, entry: AuditEntry) {
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.append(entry) {
                warn!(error = %err, "failed to write merge audit entry");
            }
        }
    }

    /// Apply queued commands; returns false once a stop was requested.
    fn drain_commands(&mut self) -> bool {
        while let Ok(command) = self.commands.try_recv() {
            if !self.apply(command) {
                return false;
            }
        }
        true
    }

    fn apply(&mut self, command: MergeCommand) -> bool {
        match command {
            MergeCommand::Enqueue(item) => {
                let task_id = item.task_id.clone();
                if let Err(err) = self.enqueue(item) {
                    warn!(task_id = %task_id, error = %err, "rejected merge request");
                }
                true
            }
            MergeCommand::Stats(reply) => {
                let _ = reply.send(self.queue.stats());
                true
            }
            MergeCommand::Stop => false,
        }
    }

    /// Consume the queue until stopped.
    #[instrument(skip_all)]
    pub async fn run(mut self) -> DomainResult<()> {
        info!("merge service started");
        loop {
            if !self.drain_commands() {
                break;
            }
            if self.process_next().await?.is_some() {
                continue;
            }
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.apply(command) {
                            break;
                        }
                    }
                    None => break,
                },
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!(stats = ?self.queue.stats(), "merge service stopped");
        Ok(())
    }

    /// Merge the next ready item, if there is one.
    pub async fn process_next(&mut self) -> DomainResult<Option<MergeOutcome>> {
        let Some(item) = self.queue.dequeue() else {
            return Ok(None);
        };
        let outcome = self.process_item(&item).await?;

        match &outcome {
            MergeOutcome::Merged { task_id } => {
                self.publish(CoreEvent::MergeCompleted { task_id: task_id.clone() });
            }
            MergeOutcome::Deferred { task_id, retry_count } => {
                self.publish(CoreEvent::MergeDeferred {
                    task_id: task_id.clone(),
                    retry_count: *retry_count,
                });
            }
            MergeOutcome::Failed { task_id, needs_escalation, .. } => {
                self.publish(CoreEvent::MergeFailed {
                    task_id: task_id.clone(),
                    needs_escalation: *needs_escalation,
                });
            }
        }
        if let Some(outcomes) = &self.outcomes {
            if outcomes.send(outcome.clone()).is_err() {
                debug!("merge outcome receiver dropped");
            }
        }
        Ok(Some(outcome))
    }

    #[instrument(skip_all, fields(task_id = %item.task_id, retry_count = item.retry_count))]
    async fn process_item(&mut self, item: &MergeItem) -> DomainResult<MergeOutcome> {
        let (files, infos) = match self.worker.merge(item).await {
            Ok(MergeResult::Merged { commit }) => return self.finish(item, commit, None).await,
            Ok(MergeResult::Conflict { files, infos }) => (files, infos),
            Err(err) => return self.retry_or_fail(item, err.to_string()),
        };

        info!(files = files.len(), "merge conflicted");
        let ladder = self.ladder.resolve(item, &files, &infos).await;
        self.publish(CoreEvent::ConflictClassified {
            task_id: item.task_id.clone(),
            tier: ladder.tier,
        });
        if ladder.attempts.last() == Some(&ResolutionStrategy::Human) {
            self.publish(CoreEvent::Escalated { task_id: item.task_id.clone() });
        }
        self.audit(conflict_entry(item, &files, &ladder));

        if ladder.merged_by_human() {
            return self.finish(item, None, Some(&ladder)).await;
        }
        if ladder.human_action == Some(HumanAction::Cancelled) {
            return Ok(self.fail(item, "merge cancelled by human".to_string()));
        }
        if !ladder.resolved() {
            return self.retry_or_fail(item, format!("{} conflict unresolved", ladder.tier));
        }

        match self.worker.merge(item).await {
            Ok(MergeResult::Merged { commit }) => self.finish(item, commit, Some(&ladder)).await,
            Ok(MergeResult::Conflict { files, .. }) => self.retry_or_fail(
                item,
                format!("conflicts remain after resolution: {}", files.join(", ")),
            ),
            Err(err) => self.retry_or_fail(item, err.to_string()),
        }
    }

    async fn finish(
        &mut self,
        item: &MergeItem,
        commit: Option<String>,
        ladder: Option<&LadderOutcome>,
    ) -> DomainResult<MergeOutcome> {
        if let Err(err) = self.worktrees.remove(&item.worktree).await {
            warn!(task_id = %item.task_id, error = %err, "worktree cleanup failed");
        }
        self.queue.mark_completed(&item.task_id);

        let mut entry = AuditEntry::new(item.task_id.clone(), AuditEntryType::Merge, "merged")
            .with_field("branch", item.branch.clone())
            .with_field("retry_count", item.retry_count);
        if let Some(commit) = commit {
            entry = entry.with_field("commit", commit);
        }
        if let Some(strategy) = ladder.and_then(|l| l.resolved_by) {
            entry = entry.with_field("resolved_by", strategy.as_str());
        }
        self.audit(entry);

        Ok(MergeOutcome::Merged {
            task_id: item.task_id.clone(),
        })
    }

    fn retry_or_fail(&mut self, item: &MergeItem, reason: String) -> DomainResult<MergeOutcome> {
        if item.retry_count < self.queue.escalation_threshold() {
            let retry_count = self.queue.defer_to_end(&item.task_id)?;
            info!(task_id = %item.task_id, retry_count, reason = %reason, "merge deferred");
            return Ok(MergeOutcome::Deferred {
                task_id: item.task_id.clone(),
                retry_count,
            });
        }
        Ok(self.fail(item, reason))
    }

    fn fail(&mut self, item: &MergeItem, reason: String) -> MergeOutcome {
        let needs_escalation = self
            .queue
            .mark_failed(&item.task_id)
            .is_some_and(|f| f.needs_escalation);
        self.audit(
            AuditEntry::new(item.task_id.clone(), AuditEntryType::Escalation, "merge_failed")
                .with_field("reason", reason.clone())
                .with_field("retry_count", item.retry_count)
                .with_field("needs_escalation", needs_escalation),
        );
        MergeOutcome::Failed {
            task_id: item.task_id.clone(),
            needs_escalation,
            reason,
        }
    }
}

fn conflict_entry(item: &MergeItem, files: &[String], ladder: &LadderOutcome) -> AuditEntry {
    let attempts: Vec<&str> = ladder.attempts.iter().map(|s| s.as_str()).collect();
    AuditEntry::new(item.task_id.clone(), AuditEntryType::Merge, "conflict")
        .with_field("tier", ladder.tier.as_str())
        .with_field("files", files.to_vec())
        .with_field("attempts", attempts)
        .with_field("resolved", ladder.resolved())
}
