//! Explicit state machines for the application mode and the orchestration
//! loop phase.
//!
//! Both are pure: a transition function maps `(state, event)` to the next
//! state (plus effect descriptors for the app mode). Nothing here performs
//! side effects; callers interpret the effects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level mode of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    #[default]
    Init,
    Planning,
    Review,
    Implementation,
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Planning => "planning",
            Self::Review => "review",
            Self::Implementation => "implementation",
        };
        f.write_str(name)
    }
}

/// Events that drive [`AppMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ConfigComplete,
    PlanApproved,
    ReviewPassed,
    NeedsRevision,
    TriggerPlanning,
    ForceInit,
    ForcePlanning,
    /// Jump straight to implementation (`--mode` style override)
    SetImplementationMode,
    /// Restore from a persisted session status string
    RestoreState { status: String },
}

/// Side effects requested by an app-mode transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEffect {
    PersistConfig,
    StartOrchestration,
    PauseOrchestration,
    ValidatePlan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTransition {
    pub next: AppMode,
    pub effects: Vec<AppEffect>,
}

/// Apply `event` to `mode`. `None` means the event is ignored in this mode.
pub fn transition_app(mode: AppMode, event: &AppEvent) -> Option<AppTransition> {
    let next = match (mode, event) {
        (_, AppEvent::ForceInit) => AppMode::Init,
        (_, AppEvent::ForcePlanning) => AppMode::Planning,
        (_, AppEvent::SetImplementationMode) => AppMode::Implementation,
        (_, AppEvent::RestoreState { status }) => match status.as_str() {
            "ready" | "implementation" => AppMode::Implementation,
            "reviewing" => AppMode::Review,
            _ => AppMode::Planning,
        },
        (AppMode::Init, AppEvent::ConfigComplete) => AppMode::Planning,
        (AppMode::Planning, AppEvent::PlanApproved) => AppMode::Review,
        (AppMode::Review, AppEvent::ReviewPassed) => AppMode::Implementation,
        (AppMode::Review, AppEvent::NeedsRevision)
        | (AppMode::Implementation, AppEvent::TriggerPlanning) => AppMode::Planning,
        _ => return None,
    };

    let mut effects = Vec::new();
    if matches!(event, AppEvent::ConfigComplete) {
        effects.push(AppEffect::PersistConfig);
    }
    if next == AppMode::Review && mode != AppMode::Review {
        effects.push(AppEffect::ValidatePlan);
    }
    if mode == AppMode::Implementation && next != AppMode::Implementation {
        effects.push(AppEffect::PauseOrchestration);
    }
    if next == AppMode::Implementation && mode != AppMode::Implementation {
        effects.push(AppEffect::StartOrchestration);
    }

    Some(AppTransition { next, effects })
}

/// Phase of the orchestration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    #[default]
    Idle,
    Running,
    Paused,
    /// Stop requested; waiting for active workers to finish
    Draining,
    Stopped,
}

impl LoopPhase {
    pub fn accepts_assignments(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    Start,
    Pause,
    Resume,
    Stop,
    /// Every slot has been released
    Drained,
}

/// Apply `signal` to `phase`. `None` means no change (e.g. a repeated start).
pub fn transition_loop(phase: LoopPhase, signal: LoopSignal) -> Option<LoopPhase> {
    match (phase, signal) {
        (LoopPhase::Idle | LoopPhase::Stopped, LoopSignal::Start)
        | (LoopPhase::Paused, LoopSignal::Resume) => Some(LoopPhase::Running),
        (LoopPhase::Running, LoopSignal::Pause) => Some(LoopPhase::Paused),
        (LoopPhase::Running | LoopPhase::Paused, LoopSignal::Stop) => Some(LoopPhase::Draining),
        (LoopPhase::Idle, LoopSignal::Stop) | (LoopPhase::Draining, LoopSignal::Drained) => {
            Some(LoopPhase::Stopped)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_to_implementation() {
        let t = transition_app(AppMode::Init, &AppEvent::ConfigComplete).unwrap();
        assert_eq!(t.next, AppMode::Planning);
        assert_eq!(t.effects, vec![AppEffect::PersistConfig]);

        let t = transition_app(t.next, &AppEvent::PlanApproved).unwrap();
        assert_eq!(t.next, AppMode::Review);
        assert!(t.effects.contains(&AppEffect::ValidatePlan));

        let t = transition_app(t.next, &AppEvent::ReviewPassed).unwrap();
        assert_eq!(t.next, AppMode::Implementation);
        assert_eq!(t.effects, vec![AppEffect::StartOrchestration]);
    }

    #[test]
    fn test_revision_and_replanning() {
        assert_eq!(
            transition_app(AppMode::Review, &AppEvent::NeedsRevision).unwrap().next,
            AppMode::Planning
        );
        let t = transition_app(AppMode::Implementation, &AppEvent::TriggerPlanning).unwrap();
        assert_eq!(t.next, AppMode::Planning);
        assert_eq!(t.effects, vec![AppEffect::PauseOrchestration]);
    }

    #[test]
    fn test_ignored_events() {
        assert!(transition_app(AppMode::Init, &AppEvent::ReviewPassed).is_none());
        assert!(transition_app(AppMode::Planning, &AppEvent::TriggerPlanning).is_none());
    }

    #[test]
    fn test_restore_state() {
        let restore = |s: &str| {
            transition_app(AppMode::Init, &AppEvent::RestoreState { status: s.to_string() })
                .unwrap()
                .next
        };
        assert_eq!(restore("ready"), AppMode::Implementation);
        assert_eq!(restore("implementation"), AppMode::Implementation);
        assert_eq!(restore("reviewing"), AppMode::Review);
        assert_eq!(restore("anything-else"), AppMode::Planning);
    }

    #[test]
    fn test_loop_phase_transitions() {
        assert_eq!(transition_loop(LoopPhase::Idle, LoopSignal::Start), Some(LoopPhase::Running));
        assert_eq!(transition_loop(LoopPhase::Running, LoopSignal::Start), None);
        assert_eq!(transition_loop(LoopPhase::Running, LoopSignal::Pause), Some(LoopPhase::Paused));
        assert_eq!(transition_loop(LoopPhase::Paused, LoopSignal::Resume), Some(LoopPhase::Running));
        assert_eq!(transition_loop(LoopPhase::Paused, LoopSignal::Stop), Some(LoopPhase::Draining));
        assert_eq!(transition_loop(LoopPhase::Draining, LoopSignal::Drained), Some(LoopPhase::Stopped));
        assert_eq!(transition_loop(LoopPhase::Draining, LoopSignal::Resume), None);
        assert!(!LoopPhase::Paused.accepts_assignments());
    }
}
