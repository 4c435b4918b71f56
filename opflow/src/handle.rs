//! Caller-facing proxy for monitoring and controlling a run.

use crate::core::{DataArtifact, RunOutcome};
use crate::events::RunObserver;
use crate::operator::Operator;
use crate::run::Run;
use std::sync::Arc;
use uuid::Uuid;

/// A handle to one pipeline run.
///
/// The handle is the only object exposed to the caller; it forwards the
/// run's control operations and terminal notification without leaking the
/// run's internals. The run itself stays alive until every in-flight stage
/// callback has drained, so dropping the handle mid-run is always safe;
/// the pipeline keeps executing and resources are released once the last
/// worker reference goes away.
pub struct RunHandle<T> {
    run: Arc<Run<T>>,
}

impl<T> std::fmt::Debug for RunHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle").field("run", &self.run).finish()
    }
}

impl<T: Send + 'static> RunHandle<T> {
    pub(crate) fn new(run: Arc<Run<T>>) -> Self {
        Self { run }
    }

    /// Returns the run's unique id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run.id()
    }

    /// Cancels the whole run. See [`Run::cancel`].
    pub fn cancel(&self) {
        self.run.cancel();
    }

    /// Cancels a single not-yet-started stage. Returns true if the
    /// operator was removed from the queue; false if the whole run had to
    /// be canceled instead (or the operator is unknown).
    pub fn cancel_operator(&self, op: &Arc<dyn Operator<T>>) -> bool {
        self.run.cancel_operator(op)
    }

    /// Returns true while the pipeline is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run.is_running()
    }

    /// Returns the data artifact of this run.
    ///
    /// The payload reflects all transforms applied so far; it is the final
    /// result once the run has finished.
    #[must_use]
    pub fn result(&self) -> Arc<DataArtifact<T>> {
        Arc::clone(self.run.artifact())
    }

    /// Appends an operator to the live pipeline. Returns false once the
    /// run is no longer running.
    pub fn add_operator(&self, op: Arc<dyn Operator<T>>) -> bool {
        self.run.add_operator(op)
    }

    /// Returns the run's operators in pipeline order.
    #[must_use]
    pub fn operators(&self) -> Vec<Arc<dyn Operator<T>>> {
        self.run.operators()
    }

    /// Returns the operators whose stages have finished, in execution
    /// order.
    #[must_use]
    pub fn finished_operators(&self) -> Vec<Arc<dyn Operator<T>>> {
        self.run.finished_operators()
    }

    /// Attaches an observer for the terminal notification; a run that is
    /// already terminal replays the notification immediately.
    pub fn observe(&self, observer: Arc<dyn RunObserver>) {
        self.run.observe(observer);
    }

    /// Returns the terminal outcome if the run has reached one.
    #[must_use]
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.run.outcome()
    }

    /// Waits for the run's terminal notification.
    pub async fn wait(&self) -> RunOutcome {
        let mut rx = self.run.subscribe();
        loop {
            if let Some(outcome) = *rx.borrow_and_update() {
                return outcome;
            }
            // The run (and with it the sender) outlives this handle, so
            // the channel cannot close before an outcome is published.
            let _ = rx.changed().await;
        }
    }
}
