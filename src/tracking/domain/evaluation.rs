use super::channel::{ChannelName, Revision};
use super::package_snapshot::PackageSnapshot;
use crate::shared::error::TrackerError;
use crate::shared::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned evaluation identifier; ids grow in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvaluationId(pub i64);

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Evaluation state machine.
///
/// Transitions are strictly forward:
/// `Pending -> Running -> {Completed | Failed}`. Terminal states have no
/// outgoing transitions. `Running -> Failed` also covers crash recovery of
/// evaluations orphaned by a dead process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl EvaluationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationState::Pending => "PENDING",
            EvaluationState::Running => "RUNNING",
            EvaluationState::Completed => "COMPLETED",
            EvaluationState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationState::Completed | EvaluationState::Failed)
    }

    pub fn can_transition_to(&self, next: EvaluationState) -> bool {
        matches!(
            (self, next),
            (EvaluationState::Pending, EvaluationState::Running)
                | (EvaluationState::Running, EvaluationState::Completed)
                | (EvaluationState::Running, EvaluationState::Failed)
        )
    }

    /// Checks a transition and returns the classified error if it is not allowed.
    pub fn ensure_transition(&self, id: EvaluationId, next: EvaluationState) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TrackerError::InvalidTransition {
                evaluation_id: id.0,
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            }
            .into())
        }
    }
}

impl std::str::FromStr for EvaluationState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(EvaluationState::Pending),
            "RUNNING" => Ok(EvaluationState::Running),
            "COMPLETED" => Ok(EvaluationState::Completed),
            "FAILED" => Ok(EvaluationState::Failed),
            other => anyhow::bail!("Unknown evaluation state '{}'", other),
        }
    }
}

impl fmt::Display for EvaluationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evaluation entity, unique per (channel, revision).
///
/// `error` is present iff the state is `Failed`; the package snapshot of a
/// `Completed` evaluation is loaded separately because it can be large.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub channel: ChannelName,
    pub revision: Revision,
    pub state: EvaluationState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Terminal outcome written by the scheduler.
#[derive(Debug, Clone)]
pub enum EvaluationOutcome {
    Completed(PackageSnapshot),
    Failed(String),
}

impl EvaluationOutcome {
    pub fn state(&self) -> EvaluationState {
        match self {
            EvaluationOutcome::Completed(_) => EvaluationState::Completed,
            EvaluationOutcome::Failed(_) => EvaluationState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EvaluationState; 4] = [
        EvaluationState::Pending,
        EvaluationState::Running,
        EvaluationState::Completed,
        EvaluationState::Failed,
    ];

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(EvaluationState::Pending.can_transition_to(EvaluationState::Running));
        assert!(EvaluationState::Running.can_transition_to(EvaluationState::Completed));
        assert!(EvaluationState::Running.can_transition_to(EvaluationState::Failed));
    }

    #[test]
    fn test_no_transition_out_of_terminal_states() {
        for next in ALL {
            assert!(!EvaluationState::Completed.can_transition_to(next));
            assert!(!EvaluationState::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_skipping_or_backwards_transitions() {
        assert!(!EvaluationState::Pending.can_transition_to(EvaluationState::Completed));
        assert!(!EvaluationState::Pending.can_transition_to(EvaluationState::Failed));
        assert!(!EvaluationState::Running.can_transition_to(EvaluationState::Pending));
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_ensure_transition_error() {
        let err = EvaluationState::Completed
            .ensure_transition(EvaluationId(3), EvaluationState::Running)
            .unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("COMPLETED -> RUNNING"));
    }

    #[test]
    fn test_state_string_round_trip() {
        for state in ALL {
            assert_eq!(state.as_str().parse::<EvaluationState>().unwrap(), state);
        }
        assert!("CRASHED".parse::<EvaluationState>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!EvaluationState::Pending.is_terminal());
        assert!(!EvaluationState::Running.is_terminal());
        assert!(EvaluationState::Completed.is_terminal());
        assert!(EvaluationState::Failed.is_terminal());
    }
}
