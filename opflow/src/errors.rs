//! Error types for stage execution.
//!
//! A stage failure never crosses the pool-submission boundary as an unwind:
//! it is always converted into a [`TransformOutcome`](crate::core::TransformOutcome)
//! before the run machinery sees it. These types carry the detail an
//! operator wants to record alongside that outcome.

use thiserror::Error;

/// A failure raised by an operator's transform.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// The transform reported a failure.
    #[error("operator '{operator}' failed: {reason}")]
    TransformFailed {
        /// The operator name.
        operator: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The transform panicked; the panic was caught at the stage boundary.
    #[error("operator '{operator}' panicked during transform")]
    TransformPanicked {
        /// The operator name.
        operator: String,
    },
}

impl StageError {
    /// Creates a transform failure error.
    #[must_use]
    pub fn transform_failed(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransformFailed {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    /// Creates a transform panic error.
    #[must_use]
    pub fn transform_panicked(operator: impl Into<String>) -> Self {
        Self::TransformPanicked {
            operator: operator.into(),
        }
    }

    /// Returns the name of the operator that failed.
    #[must_use]
    pub fn operator(&self) -> &str {
        match self {
            Self::TransformFailed { operator, .. } | Self::TransformPanicked { operator } => {
                operator
            }
        }
    }
}
