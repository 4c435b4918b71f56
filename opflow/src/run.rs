//! Run state machine and stage sequencing.
//!
//! A run owns the pending queue of stage tasks for one pipeline invocation
//! and advances it one stage at a time: when a stage reports its outcome,
//! the run either submits the next stage, finalizes, or cancels. All run
//! bookkeeping happens behind a single mutex, so queue mutation, the
//! currently-executing reference, and state transitions can never be
//! observed half-applied. Terminal notifications are dispatched after the
//! lock is released.

use crate::core::{DataArtifact, RunOutcome, RunState, TransformOutcome};
use crate::events::RunObserver;
use crate::handle::RunHandle;
use crate::operator::Operator;
use crate::pool::{JobTicket, WorkerPool};
use crate::task::StageTask;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One execution of an ordered operator sequence against one artifact.
///
/// Constructed by the engine entry point and driven through a
/// [`RunHandle`]; the run stays alive until the last in-flight stage
/// callback has drained, even if the handle is dropped earlier.
pub struct Run<T> {
    id: Uuid,
    artifact: Arc<DataArtifact<T>>,
    pool: Arc<WorkerPool>,
    // Handed to pool jobs so a stage callback can reach back into the
    // run; always upgradable while a caller or worker holds the Arc.
    weak_self: Weak<Self>,
    inner: Mutex<Inner<T>>,
    outcome_tx: watch::Sender<Option<RunOutcome>>,
    outcome_rx: watch::Receiver<Option<RunOutcome>>,
}

struct Inner<T> {
    state: RunState,
    queue: VecDeque<Arc<StageTask<T>>>,
    current: Option<CurrentStage<T>>,
    finished: Vec<Arc<StageTask<T>>>,
    operators: Vec<Arc<dyn Operator<T>>>,
    observers: Vec<Arc<dyn RunObserver>>,
    notified: Option<RunOutcome>,
}

struct CurrentStage<T> {
    task: Arc<StageTask<T>>,
    ticket: JobTicket,
}

/// A terminal notification captured under the lock, dispatched outside it.
struct Notification {
    outcome: RunOutcome,
    observers: Vec<Arc<dyn RunObserver>>,
}

impl<T: Send + 'static> Run<T> {
    /// Creates a run over the global worker pool.
    #[must_use]
    pub fn new(artifact: T, operators: Vec<Arc<dyn Operator<T>>>) -> Arc<Self> {
        Self::with_pool(artifact, operators, Arc::clone(WorkerPool::global()))
    }

    /// Creates a run over a dedicated worker pool.
    #[must_use]
    pub fn with_pool(
        artifact: T,
        operators: Vec<Arc<dyn Operator<T>>>,
        pool: Arc<WorkerPool>,
    ) -> Arc<Self> {
        let artifact = Arc::new(DataArtifact::new(artifact));
        let queue = operators
            .iter()
            .map(|op| Arc::new(StageTask::new(Arc::clone(op), Arc::clone(&artifact))))
            .collect();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        Arc::new_cyclic(|weak_self| Self {
            id: Uuid::new_v4(),
            artifact,
            pool,
            weak_self: Weak::clone(weak_self),
            inner: Mutex::new(Inner {
                state: RunState::Created,
                queue,
                current: None,
                finished: Vec::new(),
                operators,
                observers: Vec::new(),
                notified: None,
            }),
            outcome_tx,
            outcome_rx,
        })
    }

    /// Returns the run's unique id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the data artifact this run transforms.
    #[must_use]
    pub fn artifact(&self) -> &Arc<DataArtifact<T>> {
        &self.artifact
    }

    /// Returns the run's current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.inner.lock().state
    }

    /// Returns true while the pipeline is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Returns the operators of this run, in pipeline order.
    ///
    /// Reflects live mutation: appended operators are included, operators
    /// removed by a selective cancel are not.
    #[must_use]
    pub fn operators(&self) -> Vec<Arc<dyn Operator<T>>> {
        self.inner.lock().operators.clone()
    }

    /// Returns the operators whose stages have finished, in execution order.
    #[must_use]
    pub fn finished_operators(&self) -> Vec<Arc<dyn Operator<T>>> {
        self.inner
            .lock()
            .finished
            .iter()
            .map(|task| Arc::clone(task.operator()))
            .collect()
    }

    /// Returns the terminal outcome if the run has reached one.
    #[must_use]
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.inner.lock().notified
    }

    /// Starts the pipeline and returns the caller-facing handle.
    ///
    /// The first stage is submitted to the pool rather than executed
    /// inline, so the caller always holds the handle before any stage
    /// callback can fire. An empty pipeline finalizes immediately as a
    /// success. Calling `start` on an already-started run is a no-op.
    pub fn start(self: Arc<Self>) -> RunHandle<T> {
        let notification = {
            let mut inner = self.inner.lock();
            if inner.state == RunState::Created {
                inner.state = RunState::Running;
                debug!(run_id = %self.id, stages = inner.queue.len(), "run started");
                if inner.queue.is_empty() {
                    inner.state = RunState::Complete;
                    Self::record(&mut inner, RunOutcome::Finished { success: true })
                } else {
                    self.submit_next(&mut inner);
                    None
                }
            } else {
                None
            }
        };
        self.dispatch(notification);
        RunHandle::new(self)
    }

    /// Cancels the whole run.
    ///
    /// Idempotent; a no-op once the run is terminal. If a stage is
    /// currently executing it is signaled cooperatively and the canceled
    /// notification fires when its outcome arrives; if the stage had not
    /// started yet it is revoked from the pool and the notification fires
    /// immediately, as it does when no stage is in flight at all.
    pub fn cancel(&self) {
        let notification = {
            let mut inner = self.inner.lock();
            self.cancel_locked(&mut inner)
        };
        self.dispatch(notification);
    }

    /// Cancellation body shared by [`Run::cancel`] and the in-flight arm
    /// of [`Run::cancel_operator`]. Caller holds the lock.
    fn cancel_locked(&self, inner: &mut Inner<T>) -> Option<Notification> {
        if inner.state.is_terminal() {
            return None;
        }
        inner.state = RunState::Canceled;
        debug!(run_id = %self.id, "run canceled");
        if let Some(CurrentStage { task, ticket }) = inner.current.take() {
            task.request_cancel();
            if self.pool.try_revoke(ticket) {
                // The stage never started, so no outcome will arrive.
                Self::record(inner, RunOutcome::Canceled)
            } else {
                // In flight: the notification rides on the stage outcome.
                None
            }
        } else {
            Self::record(inner, RunOutcome::Canceled)
        }
    }

    /// Cancels a single not-yet-started stage.
    ///
    /// Returns true if the operator was removed from the queue before it
    /// ran, leaving the rest of the run untouched. Targeting the operator
    /// currently executing degrades to a full-run cancel and returns
    /// false, as does targeting an operator this run does not know. The
    /// queue search and the in-flight check share one critical section, so
    /// a stage cannot slip from the queue into execution between them.
    pub fn cancel_operator(&self, op: &Arc<dyn Operator<T>>) -> bool {
        let (removed, notification) = {
            let mut inner = self.inner.lock();
            if let Some(position) = inner
                .queue
                .iter()
                .position(|task| Arc::ptr_eq(task.operator(), op))
            {
                inner.queue.remove(position);
                inner.operators.retain(|existing| !Arc::ptr_eq(existing, op));
                debug!(run_id = %self.id, operator = %op.name(), "queued stage removed");
                (true, None)
            } else if inner
                .current
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current.task.operator(), op))
            {
                // A stage in flight cannot be removed without stopping the
                // pipeline.
                (false, self.cancel_locked(&mut inner))
            } else {
                (false, None)
            }
        };
        self.dispatch(notification);
        removed
    }

    /// Appends an operator to a live pipeline.
    ///
    /// Accepted only while the run is `Running`; otherwise the queue is
    /// left untouched and false is returned.
    pub fn add_operator(&self, op: Arc<dyn Operator<T>>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != RunState::Running {
            debug!(run_id = %self.id, state = %inner.state, "add_operator rejected");
            return false;
        }
        inner.queue.push_back(Arc::new(StageTask::new(
            Arc::clone(&op),
            Arc::clone(&self.artifact),
        )));
        inner.operators.push(op);
        true
    }

    /// Attaches an observer for the terminal notification.
    ///
    /// If the run is already terminal the notification is replayed to the
    /// observer immediately, so late attachment never loses the event.
    pub fn observe(&self, observer: Arc<dyn RunObserver>) {
        let replay = {
            let mut inner = self.inner.lock();
            if inner.notified.is_none() {
                inner.observers.push(Arc::clone(&observer));
            }
            inner.notified
        };
        if let Some(outcome) = replay {
            deliver(observer.as_ref(), outcome);
        }
    }

    /// Returns a watch receiver that resolves to the terminal outcome.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<RunOutcome>> {
        self.outcome_rx.clone()
    }

    /// Consumes one stage outcome and advances the state machine.
    ///
    /// Cancellation takes precedence over a stale success or failure
    /// racing in from the same stage; then error stops the pipeline; then
    /// the next stage starts; otherwise the run is done.
    fn on_stage_finished(&self, task: &Arc<StageTask<T>>, outcome: TransformOutcome) {
        let notification = {
            let mut inner = self.inner.lock();
            inner.current = None;
            inner.finished.push(Arc::clone(task));
            debug!(
                run_id = %self.id,
                operator = %task.operator().name(),
                outcome = %outcome,
                "stage finished"
            );

            if inner.state == RunState::Canceled
                || outcome == TransformOutcome::Canceled
                || task.is_canceled()
            {
                inner.state = RunState::Canceled;
                Self::record(&mut inner, RunOutcome::Canceled)
            } else if outcome == TransformOutcome::Error {
                inner.state = RunState::Complete;
                Self::record(&mut inner, RunOutcome::Finished { success: false })
            } else if inner.queue.is_empty() {
                inner.state = RunState::Complete;
                Self::record(&mut inner, RunOutcome::Finished { success: true })
            } else {
                self.submit_next(&mut inner);
                None
            }
        };
        self.dispatch(notification);
    }

    /// Dequeues the next stage and hands it to the pool. Caller holds the
    /// lock and has verified the queue is non-empty.
    fn submit_next(&self, inner: &mut Inner<T>) {
        let Some(run) = self.weak_self.upgrade() else {
            return;
        };
        if let Some(task) = inner.queue.pop_front() {
            let job_task = Arc::clone(&task);
            let ticket = self.pool.submit(move || {
                let outcome = job_task.execute();
                run.on_stage_finished(&job_task, outcome);
            });
            debug!(run_id = %self.id, operator = %task.operator().name(), "stage submitted");
            inner.current = Some(CurrentStage { task, ticket });
        }
    }

    /// Marks the terminal outcome exactly once; returns the notification
    /// to dispatch after the lock is released, if this call won the race.
    fn record(inner: &mut Inner<T>, outcome: RunOutcome) -> Option<Notification> {
        if inner.notified.is_some() {
            return None;
        }
        inner.notified = Some(outcome);
        Some(Notification {
            outcome,
            observers: std::mem::take(&mut inner.observers),
        })
    }

    fn dispatch(&self, notification: Option<Notification>) {
        let Some(Notification { outcome, observers }) = notification else {
            return;
        };
        info!(run_id = %self.id, outcome = %outcome, "run reached terminal state");
        self.outcome_tx.send_replace(Some(outcome));
        for observer in observers {
            deliver(observer.as_ref(), outcome);
        }
    }
}

/// Delivers one terminal notification; a panicking observer is logged and
/// suppressed so it cannot poison the run machinery.
fn deliver(observer: &dyn RunObserver, outcome: RunOutcome) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| match outcome {
        RunOutcome::Finished { success } => observer.on_finished(success),
        RunOutcome::Canceled => observer.on_canceled(),
    }));
    if result.is_err() {
        warn!(outcome = %outcome, "run observer panicked");
    }
}

impl<T> std::fmt::Debug for Run<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Run")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("queued", &inner.queue.len())
            .field("finished", &inner.finished.len())
            .finish()
    }
}
