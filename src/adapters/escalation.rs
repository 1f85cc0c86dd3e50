//! Human escalation delivered over a channel.
//!
//! Each escalation becomes a [`PendingEscalation`] on an `mpsc` channel;
//! whatever surface drains the channel answers through the embedded
//! `oneshot` sender. Dropping the pending escalation without answering, or
//! having no receiver at all, counts as the human being unreachable.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{EscalationRequest, HumanAction, HumanEscalation};

#[derive(Debug)]
pub struct PendingEscalation {
    pub request: EscalationRequest,
    respond: oneshot::Sender<HumanAction>,
}

impl PendingEscalation {
    pub fn answer(self, action: HumanAction) -> DomainResult<()> {
        self.respond
            .send(action)
            .map_err(|_| DomainError::ChannelClosed("escalation response"))
    }
}

#[derive(Debug, Clone)]
pub struct ChannelEscalation {
    tx: mpsc::Sender<PendingEscalation>,
    timeout: Option<Duration>,
}

impl ChannelEscalation {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingEscalation>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx, timeout: None }, rx)
    }

    /// Give up waiting for an answer after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl HumanEscalation for ChannelEscalation {
    async fn escalate(&self, request: EscalationRequest) -> DomainResult<HumanAction> {
        let task_id = request.task_id.clone();
        let (respond, answer) = oneshot::channel();
        self.tx
            .send(PendingEscalation { request, respond })
            .await
            .map_err(|_| DomainError::ChannelClosed("escalation"))?;
        info!(task_id = %task_id, "waiting for human");

        let action = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, answer).await.map_err(|_| {
                warn!(task_id = %task_id, "escalation timed out");
                DomainError::ChannelClosed("escalation timed out")
            })?,
            None => answer.await,
        };
        action.map_err(|_| DomainError::ChannelClosed("escalation response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EscalationRequest {
        EscalationRequest {
            task_id: "ch-1".into(),
            worktree: "/wt/ch-1".into(),
            conflict_files: vec!["src/lib.rs".into()],
            retry_count: 2,
            last_attempt: None,
        }
    }

    #[tokio::test]
    async fn test_answer_flows_back() {
        let (escalation, mut rx) = ChannelEscalation::new(4);
        let surface = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            assert_eq!(pending.request.retry_count, 2);
            pending.answer(HumanAction::Skipped).unwrap();
        });
        assert_eq!(escalation.escalate(request()).await.unwrap(), HumanAction::Skipped);
        surface.await.unwrap();
    }

    #[tokio::test]
    async fn test_escalation_waits_for_answer() {
        let (escalation, mut rx) = ChannelEscalation::new(1);
        let mut waiting = tokio_test::task::spawn(escalation.escalate(request()));
        tokio_test::assert_pending!(waiting.poll());

        let pending = rx.recv().await.unwrap();
        tokio_test::assert_pending!(waiting.poll());

        pending.answer(HumanAction::Merged).unwrap();
        assert!(waiting.is_woken());
        let action = tokio_test::assert_ready_ok!(waiting.poll());
        assert_eq!(action, HumanAction::Merged);
    }

    #[tokio::test]
    async fn test_dropped_request_is_unreachable() {
        let (escalation, mut rx) = ChannelEscalation::new(1);
        tokio::spawn(async move {
            drop(rx.recv().await);
        });
        assert!(escalation.escalate(request()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let (escalation, _rx) = ChannelEscalation::new(1);
        let escalation = escalation.with_timeout(Duration::from_secs(30));
        assert!(escalation.escalate(request()).await.is_err());
    }
}
