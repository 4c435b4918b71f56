//! Stage and run outcome enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The result classification of one stage execution.
///
/// Produced exactly once per stage execution, by the operator's transform
/// (or by the stage wrapper when the transform panics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOutcome {
    /// The transform finished successfully.
    Complete,
    /// The transform failed; the run halts on the first error.
    Error,
    /// The transform observed its cancel flag and stopped early.
    Canceled,
}

impl fmt::Display for TransformOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl TransformOutcome {
    /// Returns true if the outcome indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Converts a fallible transform body into an outcome.
    #[must_use]
    pub fn from_result<E>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Complete,
            Err(_) => Self::Error,
        }
    }
}

/// The lifecycle state of a run.
///
/// `Canceled` and `Complete` are terminal: once reached, no further stage
/// is ever submitted and the pending queue is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Constructed but not yet started.
    Created,
    /// Stages are being executed (or queued for execution).
    Running,
    /// The run was canceled.
    Canceled,
    /// The run finished, successfully or with a stage error.
    Complete,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Canceled => write!(f, "canceled"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

impl RunState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Complete)
    }
}

/// The terminal notification payload for a run.
///
/// Exactly one of these is delivered per run, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// All stages were processed; `success` is false if a stage errored.
    Finished {
        /// Whether every executed stage completed without error.
        success: bool,
    },
    /// The run was canceled before reaching a finished state.
    Canceled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished { success: true } => write!(f, "finished"),
            Self::Finished { success: false } => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_outcome_display() {
        assert_eq!(TransformOutcome::Complete.to_string(), "complete");
        assert_eq!(TransformOutcome::Error.to_string(), "error");
        assert_eq!(TransformOutcome::Canceled.to_string(), "canceled");
    }

    #[test]
    fn test_transform_outcome_from_result() {
        assert_eq!(
            TransformOutcome::from_result::<()>(Ok(())),
            TransformOutcome::Complete
        );
        assert_eq!(
            TransformOutcome::from_result(Err("boom")),
            TransformOutcome::Error
        );
    }

    #[test]
    fn test_run_state_is_terminal() {
        assert!(RunState::Canceled.is_terminal());
        assert!(RunState::Complete.is_terminal());
        assert!(!RunState::Created.is_terminal());
        assert!(!RunState::Running.is_terminal());
    }

    #[test]
    fn test_run_outcome_display() {
        assert_eq!(RunOutcome::Finished { success: true }.to_string(), "finished");
        assert_eq!(RunOutcome::Finished { success: false }.to_string(), "failed");
        assert_eq!(RunOutcome::Canceled.to_string(), "canceled");
    }

    #[test]
    fn test_outcome_serialize() {
        let json = serde_json::to_string(&TransformOutcome::Canceled).unwrap();
        assert_eq!(json, r#""canceled""#);

        let state: RunState = serde_json::from_str(r#""running""#).unwrap();
        assert_eq!(state, RunState::Running);

        let outcome = RunOutcome::Finished { success: false };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: RunOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }
}
