//! The executable binding of one operator to the shared artifact.

use crate::core::{DataArtifact, TransformOutcome};
use crate::operator::Operator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// One stage of a run: an operator bound to the run's data artifact.
///
/// A stage task is submitted to the worker pool at most once and is
/// discarded after its outcome has been consumed. It owns the cooperative
/// cancel handshake with its operator but no other state.
pub struct StageTask<T> {
    operator: Arc<dyn Operator<T>>,
    artifact: Arc<DataArtifact<T>>,
    executed: AtomicBool,
}

impl<T> StageTask<T> {
    /// Binds an operator to the artifact for one execution.
    #[must_use]
    pub fn new(operator: Arc<dyn Operator<T>>, artifact: Arc<DataArtifact<T>>) -> Self {
        Self {
            operator,
            artifact,
            executed: AtomicBool::new(false),
        }
    }

    /// Returns the bound operator.
    #[must_use]
    pub fn operator(&self) -> &Arc<dyn Operator<T>> {
        &self.operator
    }

    /// Runs the operator's transform and yields its outcome.
    ///
    /// Exactly one outcome is produced per task. A panic inside the
    /// transform is caught here and reported as [`TransformOutcome::Error`];
    /// no unwind ever crosses into the pool.
    pub fn execute(&self) -> TransformOutcome {
        if self.executed.swap(true, Ordering::SeqCst) {
            warn!(operator = %self.operator.name(), "stage task executed twice; ignoring");
            return TransformOutcome::Error;
        }

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.operator.transform(&self.artifact)
        }));

        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(operator = %self.operator.name(), "transform panicked");
                TransformOutcome::Error
            }
        }
    }

    /// Delegates cancellation to the operator's cooperative hook.
    pub fn request_cancel(&self) {
        self.operator.request_cancel();
    }

    /// Returns whether the bound operator observed a cancel request.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.operator.is_canceled()
    }
}

impl<T> std::fmt::Debug for StageTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageTask")
            .field("operator", &self.operator.name())
            .field("executed", &self.executed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageError;
    use crate::operator::{FnOperator, NoOpOperator};

    #[test]
    fn test_execute_yields_outcome() {
        let op = FnOperator::new("inc", |artifact: &DataArtifact<i32>, _flag| {
            artifact.update(|v| *v += 1);
            Ok(())
        });
        let artifact = Arc::new(DataArtifact::new(0));
        let task = StageTask::new(op, Arc::clone(&artifact));

        assert_eq!(task.execute(), TransformOutcome::Complete);
        assert_eq!(artifact.snapshot(), 1);
    }

    #[test]
    fn test_execute_twice_is_rejected() {
        let op = NoOpOperator::new("noop");
        let artifact = Arc::new(DataArtifact::new(()));
        let task = StageTask::new(op, artifact);

        assert_eq!(task.execute(), TransformOutcome::Complete);
        assert_eq!(task.execute(), TransformOutcome::Error);
    }

    #[test]
    fn test_panic_becomes_error_outcome() {
        let op = FnOperator::new("explode", |_artifact: &DataArtifact<i32>, _flag| -> Result<(), StageError> {
            panic!("boom");
        });
        let artifact = Arc::new(DataArtifact::new(0));
        let task = StageTask::new(op, artifact);

        assert_eq!(task.execute(), TransformOutcome::Error);
    }

    #[test]
    fn test_cancel_handshake_delegates() {
        let op = NoOpOperator::new("noop");
        let artifact = Arc::new(DataArtifact::new(()));
        let task = StageTask::new(op, artifact);

        assert!(!task.is_canceled());
        task.request_cancel();
        assert!(task.is_canceled());
        assert_eq!(task.execute(), TransformOutcome::Canceled);
    }
}
