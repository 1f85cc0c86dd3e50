//! Cooperative scheduler that fills worker slots with ready tasks.
//!
//! All graph, slot and selection state is owned by the loop and only touched
//! inside its own turn. Workers, the merge service and control callers talk
//! to it over channels.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::crash_recovery::CrashRecovery;
use super::event_bus::{CoreEvent, EventBus};
use super::merge_service::{MergeHandle, MergeOutcome};
use super::slot_manager::SlotManager;
use super::task_graph::TaskGraph;
use super::task_selector::{SelectionContext, TaskSelector};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    task_branch, transition_loop, Config, LoopPhase, LoopSignal, MergeItem, OrchestrationConfig,
    Task, TaskId, TaskStatus,
};
use crate::domain::ports::{Assignment, WorkerEvent, WorkerSpawner};

/// Snapshot of the loop's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopStatus {
    pub phase: LoopPhase,
    pub tasks_assigned: usize,
    pub tasks_completed: usize,
    pub consecutive_errors: u32,
    pub slots_in_use: usize,
}

#[derive(Debug)]
enum LoopControl {
    Signal(LoopSignal, oneshot::Sender<LoopPhase>),
    Status(oneshot::Sender<LoopStatus>),
}

/// Cloneable control side of a running [`OrchestrationLoop`].
#[derive(Debug, Clone)]
pub struct LoopHandle {
    tx: mpsc::UnboundedSender<LoopControl>,
}

impl LoopHandle {
    async fn signal(&self, signal: LoopSignal) -> DomainResult<LoopPhase> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(LoopControl::Signal(signal, tx))
            .map_err(|_| DomainError::ChannelClosed("orchestration loop"))?;
        rx.await
            .map_err(|_| DomainError::ChannelClosed("orchestration loop"))
    }

    pub async fn start(&self) -> DomainResult<LoopPhase> {
        self.signal(LoopSignal::Start).await
    }

    pub async fn pause(&self) -> DomainResult<LoopPhase> {
        self.signal(LoopSignal::Pause).await
    }

    pub async fn resume(&self) -> DomainResult<LoopPhase> {
        self.signal(LoopSignal::Resume).await
    }

    /// Resolves once the loop has drained and stopped.
    pub async fn stop(&self) -> DomainResult<LoopPhase> {
        self.signal(LoopSignal::Stop).await
    }

    pub async fn status(&self) -> DomainResult<LoopStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(LoopControl::Status(tx))
            .map_err(|_| DomainError::ChannelClosed("orchestration loop"))?;
        rx.await
            .map_err(|_| DomainError::ChannelClosed("orchestration loop"))
    }
}

pub struct OrchestrationLoop {
    graph: TaskGraph,
    selector: TaskSelector,
    slots: SlotManager,
    spawner: Arc<dyn WorkerSpawner>,
    recovery: Option<CrashRecovery>,
    merges: Option<MergeHandle>,
    events: EventBus,
    config: OrchestrationConfig,
    worktrees_dir: PathBuf,
    preferred_tags: Vec<String>,

    phase: LoopPhase,
    tasks_assigned: usize,
    tasks_completed: usize,
    consecutive_errors: u32,
    /// Iterations in a row without a new commit, per task
    stalled: HashMap<TaskId, u32>,
    last_completed: Option<TaskId>,
    all_done_reported: bool,
    recovered: bool,
    drain_deadline: Option<Instant>,
    stop_waiters: Vec<oneshot::Sender<LoopPhase>>,

    worker_tx: mpsc::UnboundedSender<WorkerEvent>,
    worker_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    outcome_tx: mpsc::UnboundedSender<MergeOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<MergeOutcome>,
    control_rx: mpsc::UnboundedReceiver<LoopControl>,
    handle: LoopHandle,
}

impl OrchestrationLoop {
    pub fn new(graph: TaskGraph, spawner: Arc<dyn WorkerSpawner>, config: &Config) -> Self {
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Self {
            graph,
            selector: TaskSelector::from_config(&config.selection),
            slots: SlotManager::new(config.orchestration.max_slots),
            spawner,
            recovery: None,
            merges: None,
            events: EventBus::new(),
            config: config.orchestration.clone(),
            worktrees_dir: config.worktrees_dir.clone(),
            preferred_tags: config.selection.preferred_tags.clone(),
            phase: LoopPhase::Idle,
            tasks_assigned: 0,
            tasks_completed: 0,
            consecutive_errors: 0,
            stalled: HashMap::new(),
            last_completed: None,
            all_done_reported: false,
            recovered: false,
            drain_deadline: None,
            stop_waiters: Vec::new(),
            worker_tx,
            worker_rx,
            outcome_tx,
            outcome_rx,
            control_rx,
            handle: LoopHandle { tx: control_tx },
        }
    }

    /// Orphaned `doing` tasks are returned to `todo` on the first start, and
    /// retried tasks get a recovery context built from their audit history.
    pub fn with_recovery(mut self, recovery: CrashRecovery) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Route finished work through the merge service instead of marking it
    /// done directly.
    pub fn with_merge_handle(mut self, merges: MergeHandle) -> Self {
        self.merges = Some(merges);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Sender workers use to report progress.
    pub fn worker_events(&self) -> mpsc::UnboundedSender<WorkerEvent> {
        self.worker_tx.clone()
    }

    /// Sender to hand to [`super::merge_service::MergeService::with_outcomes`].
    pub fn merge_outcomes(&self) -> mpsc::UnboundedSender<MergeOutcome> {
        self.outcome_tx.clone()
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn slots(&self) -> &SlotManager {
        &self.slots
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            phase: self.phase,
            tasks_assigned: self.tasks_assigned,
            tasks_completed: self.tasks_completed,
            consecutive_errors: self.consecutive_errors,
            slots_in_use: self.slots.in_use(),
        }
    }

    fn apply_signal(&mut self, signal: LoopSignal) -> bool {
        let Some(next) = transition_loop(self.phase, signal) else {
            debug!(phase = %self.phase, ?signal, "signal ignored");
            return false;
        };
        info!(from = %self.phase, to = %next, "loop phase changed");
        self.phase = next;
        self.events.publish(CoreEvent::LoopPhaseChanged { phase: next });
        true
    }

    /// Begin assigning work. Repeated calls are no-ops.
    pub fn start(&mut self) -> LoopPhase {
        if self.apply_signal(LoopSignal::Start) {
            self.consecutive_errors = 0;
            self.all_done_reported = false;
            self.recover_orphans();
        }
        self.phase
    }

    /// Runs once, before the first assignment. No worker of this process
    /// holds a slot yet, so every `doing` task is an orphan.
    fn recover_orphans(&mut self) {
        if self.recovered {
            return;
        }
        self.recovered = true;
        let Some(recovery) = &self.recovery else {
            return;
        };
        match recovery.recover_orphaned_tasks(&mut self.graph) {
            Ok(report) if !report.is_empty() => {
                info!(recovered = ?report.recovered_ids(), "orphaned tasks returned to todo");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "crash recovery failed"),
        }
    }

    /// Stop handing out work; active workers keep running.
    pub fn pause(&mut self) -> LoopPhase {
        self.apply_signal(LoopSignal::Pause);
        self.phase
    }

    pub fn resume(&mut self) -> LoopPhase {
        if self.apply_signal(LoopSignal::Resume) {
            self.consecutive_errors = 0;
        }
        self.phase
    }

    /// Stop assigning and start draining active workers. The loop reaches
    /// `Stopped` on a later turn, once the slots are free or the drain
    /// timeout has passed.
    pub fn begin_stop(&mut self) -> LoopPhase {
        if self.apply_signal(LoopSignal::Stop) && self.phase == LoopPhase::Draining {
            self.drain_deadline =
                Some(Instant::now() + Duration::from_secs(self.config.drain_timeout_secs));
        }
        self.phase
    }

    /// Drive the loop until it stops.
    #[instrument(skip_all)]
    pub async fn run(&mut self) -> DomainResult<LoopStatus> {
        let backoff = Duration::from_millis(self.config.idle_backoff_ms);
        while self.phase != LoopPhase::Stopped {
            if self.tick().await? > 0 {
                continue;
            }
            if self.phase == LoopPhase::Stopped {
                break;
            }
            tokio::select! {
                Some(event) = self.worker_rx.recv() => self.on_worker_event(event),
                Some(outcome) = self.outcome_rx.recv() => self.on_merge_outcome(outcome),
                Some(control) = self.control_rx.recv() => self.on_control(control),
                () = tokio::time::sleep(backoff) => {}
            }
        }
        self.notify_stopped();
        info!(status = ?self.status(), "orchestration loop stopped");
        Ok(self.status())
    }

    /// One turn: apply pending messages, assign ready tasks, then check for
    /// completion and drain. Returns the number of tasks assigned.
    pub async fn tick(&mut self) -> DomainResult<usize> {
        while let Ok(control) = self.control_rx.try_recv() {
            self.on_control(control);
        }
        while let Ok(event) = self.worker_rx.try_recv() {
            self.on_worker_event(event);
        }
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.on_merge_outcome(outcome);
        }

        let assigned = self.assign_ready().await?;
        if assigned == 0 {
            self.check_all_done();
        }
        if self.phase == LoopPhase::Draining {
            self.check_drain().await;
        }
        if self.phase == LoopPhase::Stopped {
            self.notify_stopped();
        }
        Ok(assigned)
    }

    fn on_control(&mut self, control: LoopControl) {
        match control {
            LoopControl::Signal(LoopSignal::Stop, reply) => {
                self.begin_stop();
                if self.phase == LoopPhase::Stopped {
                    let _ = reply.send(self.phase);
                } else {
                    self.stop_waiters.push(reply);
                }
            }
            LoopControl::Signal(signal, reply) => {
                let phase = match signal {
                    LoopSignal::Start => self.start(),
                    LoopSignal::Pause => self.pause(),
                    LoopSignal::Resume => self.resume(),
                    LoopSignal::Stop | LoopSignal::Drained => self.phase,
                };
                let _ = reply.send(phase);
            }
            LoopControl::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn notify_stopped(&mut self) {
        for waiter in self.stop_waiters.drain(..) {
            let _ = waiter.send(self.phase);
        }
    }

    fn selection_context(&self, excluded: &HashSet<TaskId>) -> SelectionContext {
        let mut ctx = SelectionContext::new()
            .excluding(excluded.iter().cloned())
            .with_preferred_tags(self.preferred_tags.clone());
        if let Some(last) = &self.last_completed {
            ctx = ctx.with_last_completed(last.clone());
        }
        ctx
    }

    async fn assign_ready(&mut self) -> DomainResult<usize> {
        let mut excluded = HashSet::new();
        let mut assigned = 0;

        while self.phase.accepts_assignments()
            && self.slots.has_available()
            && self.tasks_assigned < self.config.max_total_tasks
        {
            let ctx = self.selection_context(&excluded);
            let Some(task) = self.selector.select(self.graph.tasks(), &ctx).cloned() else {
                break;
            };

            match self.assign(&task).await {
                Ok(()) => {
                    assigned += 1;
                    self.tasks_assigned += 1;
                    self.consecutive_errors = 0;
                    self.all_done_reported = false;
                }
                Err(err) => {
                    excluded.insert(task.id.clone());
                    self.record_error(&task.id, &err);
                }
            }
        }

        if self.tasks_assigned >= self.config.max_total_tasks && self.phase.accepts_assignments() {
            debug!(limit = self.config.max_total_tasks, "assignment limit reached");
        }
        Ok(assigned)
    }

    #[instrument(skip_all, fields(task_id = %task.id))]
    async fn assign(&mut self, task: &Task) -> DomainResult<()> {
        let slot = self
            .slots
            .acquire(&task.id)?
            .ok_or_else(|| DomainError::ValidationFailed("no free slot".to_string()))?;

        let worktree = self.worktrees_dir.join(task.id.as_str());
        let branch = task_branch(&task.id);
        let recovery = match &self.recovery {
            Some(recovery) => recovery.recovery_context(task).await,
            None => None,
        };
        let assignment = Assignment {
            task: task.clone(),
            slot,
            worktree: worktree.clone(),
            branch: branch.clone(),
            recovery,
        };

        if let Err(err) = self.spawner.spawn(assignment).await {
            self.slots.release(slot);
            return Err(DomainError::WorkerSpawnFailed {
                task_id: task.id.clone(),
                reason: err.to_string(),
            });
        }
        let claimed = self
            .graph
            .claim(&task.id)
            .and_then(|()| self.graph.set_workspace(&task.id, worktree, branch));
        if let Err(err) = claimed {
            if let Err(cancel) = self.spawner.cancel(&task.id).await {
                warn!(error = %cancel, "cancel after failed claim also failed");
            }
            self.slots.release(slot);
            return Err(err);
        }

        info!(%slot, "task assigned");
        self.events.publish(CoreEvent::SlotAcquired {
            slot,
            task_id: task.id.clone(),
        });
        Ok(())
    }

    fn record_error(&mut self, task_id: &TaskId, err: &DomainError) {
        self.consecutive_errors += 1;
        warn!(
            task_id = %task_id,
            error = %err,
            consecutive_errors = self.consecutive_errors,
            "assignment failed"
        );
        if self.consecutive_errors >= self.config.error_threshold {
            warn!(threshold = self.config.error_threshold, "error threshold reached, pausing");
            self.events.publish(CoreEvent::ErrorThreshold {
                consecutive_errors: self.consecutive_errors,
            });
            self.pause();
        }
    }

    fn release(&mut self, task_id: &TaskId) {
        if let Some(slot) = self.slots.release_task(task_id) {
            self.events.publish(CoreEvent::SlotReleased {
                slot,
                task_id: task_id.clone(),
            });
        }
        self.stalled.remove(task_id);
    }

    fn on_worker_event(&mut self, event: WorkerEvent) {
        let result = match event {
            WorkerEvent::Completed { task_id } => self.on_completed(&task_id),
            WorkerEvent::Failed { task_id, error } => {
                self.release(&task_id);
                warn!(task_id = %task_id, error = %error, "worker failed");
                self.graph.fail(&task_id, error)
            }
            WorkerEvent::Iteration { task_id, new_commits } => {
                self.on_iteration(&task_id, new_commits)
            }
        };
        if let Err(err) = result {
            warn!(error = %err, "worker event not applied");
        }
    }

    fn on_completed(&mut self, task_id: &TaskId) -> DomainResult<()> {
        self.release(task_id);
        let task = self
            .graph
            .get(task_id)
            .ok_or_else(|| DomainError::TaskNotFound(task_id.clone()))?;
        if task.status != TaskStatus::Doing {
            return Err(DomainError::InvalidStateTransition {
                task_id: task_id.clone(),
                from: task.status,
                to: TaskStatus::Done,
            });
        }

        let Some(merges) = &self.merges else {
            self.graph.complete(task_id)?;
            self.finished(task_id);
            return Ok(());
        };
        let worktree = task
            .execution
            .worktree
            .clone()
            .unwrap_or_else(|| self.worktrees_dir.join(task_id.as_str()));
        let item = MergeItem::for_task(task, worktree);
        info!(task_id = %task_id, "worker finished, merge requested");
        if let Err(err) = merges.enqueue(item) {
            self.graph.fail(task_id, format!("merge request failed: {err}"))?;
        }
        Ok(())
    }

    fn finished(&mut self, task_id: &TaskId) {
        self.tasks_completed += 1;
        self.last_completed = Some(task_id.clone());
    }

    fn on_iteration(&mut self, task_id: &TaskId, new_commits: u32) -> DomainResult<()> {
        let iterations = self.graph.record_iteration(task_id)?;
        let stalled = self.stalled.entry(task_id.clone()).or_default();
        if new_commits > 0 {
            *stalled = 0;
            return Ok(());
        }
        *stalled += 1;
        if *stalled >= self.config.stuck_threshold {
            let stalled = *stalled;
            warn!(task_id = %task_id, iterations, stalled, "agent appears stuck, pausing");
            self.events.publish(CoreEvent::AgentStuck {
                task_id: task_id.clone(),
                iterations,
            });
            self.pause();
        }
        Ok(())
    }

    fn on_merge_outcome(&mut self, outcome: MergeOutcome) {
        let result = match outcome {
            MergeOutcome::Merged { task_id } => self.graph.complete(&task_id).map(|()| {
                self.finished(&task_id);
            }),
            MergeOutcome::Deferred { task_id, retry_count } => {
                debug!(task_id = %task_id, retry_count, "merge deferred");
                Ok(())
            }
            MergeOutcome::Failed { task_id, reason, needs_escalation } => {
                warn!(task_id = %task_id, needs_escalation, reason = %reason, "merge failed");
                self.graph.fail(&task_id, reason)
            }
        };
        if let Err(err) = result {
            warn!(error = %err, "merge outcome not applied");
        }
    }

    fn check_all_done(&mut self) {
        if self.all_done_reported
            || self.phase != LoopPhase::Running
            || self.slots.in_use() > 0
            || self.graph.with_status(TaskStatus::Doing).next().is_some()
        {
            return;
        }
        let ctx = self.selection_context(&HashSet::new());
        if self.selector.select(self.graph.tasks(), &ctx).is_some()
            && self.tasks_assigned < self.config.max_total_tasks
        {
            return;
        }

        self.all_done_reported = true;
        info!(completed = self.tasks_completed, "no work left");
        self.events.publish(CoreEvent::AllDone);
        if self.config.exit_when_done {
            self.begin_stop();
        }
    }

    async fn check_drain(&mut self) {
        if self.slots.in_use() > 0 {
            let expired = self.drain_deadline.is_some_and(|d| Instant::now() >= d);
            if !expired {
                return;
            }
            let remaining: Vec<TaskId> = self.slots.active_tasks().map(|(_, id)| id.clone()).collect();
            warn!(workers = remaining.len(), "drain timed out, cancelling workers");
            let cancels = join_all(remaining.iter().map(|id| self.spawner.cancel(id))).await;
            for (task_id, result) in remaining.iter().zip(cancels) {
                if let Err(err) = result {
                    warn!(task_id = %task_id, error = %err, "cancel failed");
                }
                // The task stays `doing`; crash recovery returns it to the pool.
                self.release(task_id);
            }
        }
        self.drain_deadline = None;
        self.apply_signal(LoopSignal::Drained);
    }
}
