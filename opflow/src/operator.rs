//! Operator trait and basic implementations.
//!
//! Operators are the units of work a pipeline runs: named, stateful,
//! cancelable transforms over the shared data artifact.

use crate::cancellation::CancelFlag;
use crate::core::{DataArtifact, TransformOutcome};
use crate::errors::StageError;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline operators.
///
/// The engine calls `reset_state` before every run and never calls
/// `transform` concurrently on the same instance. Identity is the `Arc`
/// the operator is shared through and is stable for the length of a run.
///
/// Cancellation is cooperative: `request_cancel` raises a flag and the
/// transform is expected to poll `is_canceled` and stop early, reporting
/// [`TransformOutcome::Canceled`]. A transform that never polls can block
/// a worker thread indefinitely; the engine does not enforce timeouts.
pub trait Operator<T>: Send + Sync + Debug {
    /// Returns the name of the operator.
    fn name(&self) -> &str;

    /// Clears any per-run state (cancel flag, recorded errors) so the
    /// operator can be run again.
    fn reset_state(&self);

    /// Transforms the artifact in place and reports the outcome.
    fn transform(&self, artifact: &DataArtifact<T>) -> TransformOutcome;

    /// Requests cooperative cancellation of an in-flight transform.
    fn request_cancel(&self);

    /// Returns whether cancellation has been requested.
    fn is_canceled(&self) -> bool;

    /// Returns an independent copy of this operator with fresh state.
    fn duplicate(&self) -> Arc<dyn Operator<T>>;
}

/// A closure-backed operator.
///
/// The closure receives the artifact and the operator's cancel flag, and
/// reports failure through [`StageError`]. The last error is retained for
/// inspection until the next `reset_state`.
pub struct FnOperator<T, F>
where
    F: Fn(&DataArtifact<T>, &CancelFlag) -> Result<(), StageError> + Send + Sync,
{
    name: String,
    func: Arc<F>,
    flag: CancelFlag,
    last_error: Mutex<Option<StageError>>,
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T, F> FnOperator<T, F>
where
    F: Fn(&DataArtifact<T>, &CancelFlag) -> Result<(), StageError> + Send + Sync,
{
    /// Creates a new closure-backed operator.
    pub fn new(name: impl Into<String>, func: F) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            func: Arc::new(func),
            flag: CancelFlag::new(),
            last_error: Mutex::new(None),
            _phantom: std::marker::PhantomData,
        })
    }

    /// Returns the last error recorded by a failing transform, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<StageError> {
        self.last_error.lock().clone()
    }
}

impl<T, F> Debug for FnOperator<T, F>
where
    F: Fn(&DataArtifact<T>, &CancelFlag) -> Result<(), StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnOperator")
            .field("name", &self.name)
            .field("canceled", &self.flag.is_canceled())
            .finish()
    }
}

impl<T, F> Operator<T> for FnOperator<T, F>
where
    T: 'static,
    F: Fn(&DataArtifact<T>, &CancelFlag) -> Result<(), StageError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn reset_state(&self) {
        self.flag.reset();
        *self.last_error.lock() = None;
    }

    fn transform(&self, artifact: &DataArtifact<T>) -> TransformOutcome {
        // A stage canceled while still queued reports canceled without
        // touching the artifact.
        if self.flag.is_canceled() {
            return TransformOutcome::Canceled;
        }

        match (self.func)(artifact, &self.flag) {
            Ok(()) if self.flag.is_canceled() => TransformOutcome::Canceled,
            Ok(()) => TransformOutcome::Complete,
            Err(err) => {
                tracing::warn!(operator = %self.name, error = %err, "transform failed");
                *self.last_error.lock() = Some(err);
                TransformOutcome::Error
            }
        }
    }

    fn request_cancel(&self) {
        self.flag.request();
    }

    fn is_canceled(&self) -> bool {
        self.flag.is_canceled()
    }

    fn duplicate(&self) -> Arc<dyn Operator<T>> {
        Arc::new(Self {
            name: self.name.clone(),
            func: Arc::clone(&self.func),
            flag: CancelFlag::new(),
            last_error: Mutex::new(None),
            _phantom: std::marker::PhantomData,
        })
    }
}

/// An operator that leaves the artifact untouched. Useful in tests.
#[derive(Debug)]
pub struct NoOpOperator {
    name: String,
    flag: CancelFlag,
}

impl NoOpOperator {
    /// Creates a new no-op operator.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            flag: CancelFlag::new(),
        })
    }
}

impl<T: 'static> Operator<T> for NoOpOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset_state(&self) {
        self.flag.reset();
    }

    fn transform(&self, _artifact: &DataArtifact<T>) -> TransformOutcome {
        if self.flag.is_canceled() {
            TransformOutcome::Canceled
        } else {
            TransformOutcome::Complete
        }
    }

    fn request_cancel(&self) {
        self.flag.request();
    }

    fn is_canceled(&self) -> bool {
        self.flag.is_canceled()
    }

    fn duplicate(&self) -> Arc<dyn Operator<T>> {
        NoOpOperator::new(self.name.clone())
    }
}
