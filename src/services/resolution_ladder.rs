//! Escalating conflict resolution: auto-fix, rebase retry, delegated agent,
//! then a human.
//!
//! The ladder enters at the rung suggested for the conflict's overall tier
//! and climbs one rung per failure. A rung that errors counts as a failed
//! rung; only the human rung can end the climb without a resolution.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::conflict_classifier::ConflictClassifier;
use super::rebase_retry::RebaseRetry;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ConflictAnalysis, ConflictInfo, ConflictTier, MergeItem, ResolutionStrategy,
};
use crate::domain::ports::{
    AgentResolutionRequest, AgentResolver, AutoResolver, EscalationRequest, HumanAction,
    HumanEscalation,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LadderOutcome {
    pub tier: ConflictTier,
    /// Rungs tried, in order
    pub attempts: Vec<ResolutionStrategy>,
    /// Rung that succeeded, if any
    pub resolved_by: Option<ResolutionStrategy>,
    pub human_action: Option<HumanAction>,
}

impl LadderOutcome {
    pub fn resolved(&self) -> bool {
        self.resolved_by.is_some()
    }

    /// A human merged it by hand; no further merge attempt is needed.
    pub fn merged_by_human(&self) -> bool {
        self.resolved_by == Some(ResolutionStrategy::Human)
    }
}

pub struct ResolutionLadder {
    classifier: ConflictClassifier,
    auto: Arc<dyn AutoResolver>,
    rebase: RebaseRetry,
    agent: Arc<dyn AgentResolver>,
    human: Arc<dyn HumanEscalation>,
    main_branch: String,
}

impl ResolutionLadder {
    pub fn new(
        classifier: ConflictClassifier,
        auto: Arc<dyn AutoResolver>,
        rebase: RebaseRetry,
        agent: Arc<dyn AgentResolver>,
        human: Arc<dyn HumanEscalation>,
    ) -> Self {
        Self {
            classifier,
            auto,
            rebase,
            agent,
            human,
            main_branch: "main".to_string(),
        }
    }

    pub fn with_main_branch(mut self, branch: impl Into<String>) -> Self {
        self.main_branch = branch.into();
        self
    }

    pub fn classifier(&self) -> &ConflictClassifier {
        &self.classifier
    }

    #[instrument(skip_all, fields(task_id = %item.task_id, files = files.len()))]
    pub async fn resolve(
        &self,
        item: &MergeItem,
        files: &[String],
        infos: &[ConflictInfo],
    ) -> LadderOutcome {
        let analysis = self.classifier.analyze(files, infos);
        info!(tier = %analysis.tier, "conflict classified");

        let mut outcome = LadderOutcome {
            tier: analysis.tier,
            attempts: Vec::new(),
            resolved_by: None,
            human_action: None,
        };
        let mut rung = Some(ConflictClassifier::suggested_strategy(analysis.tier, false));

        while let Some(strategy) = rung {
            let last_attempt = outcome.attempts.last().copied();
            outcome.attempts.push(strategy);

            let attempt = match strategy {
                ResolutionStrategy::Auto => self.try_auto(item, &analysis).await,
                ResolutionStrategy::Rebase => self.try_rebase(item).await,
                ResolutionStrategy::Agent => self.try_agent(item, &analysis).await,
                ResolutionStrategy::Human => {
                    let action = self.try_human(item, files, last_attempt).await;
                    outcome.human_action = action;
                    Ok(action.is_some_and(|a| a.resolved()))
                }
            };

            match attempt {
                Ok(true) => {
                    info!(strategy = %strategy, "conflict resolved");
                    outcome.resolved_by = Some(strategy);
                    return outcome;
                }
                Ok(false) => info!(strategy = %strategy, "resolution rung failed"),
                Err(err) => warn!(strategy = %strategy, error = %err, "resolution rung errored"),
            }
            rung = strategy.escalate();
        }

        outcome
    }

    async fn try_auto(&self, item: &MergeItem, analysis: &ConflictAnalysis) -> DomainResult<bool> {
        for file in &analysis.files {
            if !self.auto.resolve(&file.file, file.tier, &item.worktree).await? {
                info!(file = %file.file, "auto-resolution failed");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn try_rebase(&self, item: &MergeItem) -> DomainResult<bool> {
        let outcome = self
            .rebase
            .rebase_and_retry(&self.main_branch, &item.worktree)
            .await?;
        if let Some(error) = &outcome.error {
            warn!(error = %error, aborted = outcome.aborted, "rebase retry failed");
        }
        Ok(outcome.ready)
    }

    async fn try_agent(&self, item: &MergeItem, analysis: &ConflictAnalysis) -> DomainResult<bool> {
        let request = AgentResolutionRequest {
            task_id: item.task_id.clone(),
            files: analysis.files.iter().map(|f| f.file.clone()).collect(),
            tier: analysis.tier,
            description: format!(
                "{} merge conflict merging {} into {}",
                analysis.tier, item.branch, self.main_branch
            ),
            cwd: item.worktree.clone(),
        };
        self.agent.resolve(&request).await
    }

    async fn try_human(
        &self,
        item: &MergeItem,
        files: &[String],
        last_attempt: Option<ResolutionStrategy>,
    ) -> Option<HumanAction> {
        let request = EscalationRequest {
            task_id: item.task_id.clone(),
            worktree: item.worktree.clone(),
            conflict_files: files.to_vec(),
            retry_count: item.retry_count,
            last_attempt,
        };
        match self.human.escalate(request).await {
            Ok(action) => {
                info!(action = ?action, "human escalation answered");
                Some(action)
            }
            Err(err) => {
                warn!(error = %err, "human escalation unavailable");
                None
            }
        }
    }
}
