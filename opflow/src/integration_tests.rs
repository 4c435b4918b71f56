//! End-to-end pipeline tests: sequencing, failure, cancellation, and live
//! queue mutation, driven over dedicated worker pools for determinism.

use crate::cancellation::CancelFlag;
use crate::core::{DataArtifact, RunOutcome, TransformOutcome};
use crate::engine;
use crate::errors::StageError;
use crate::events::{CollectingObserver, RunObserver};
use crate::operator::{FnOperator, Operator};
use crate::pool::WorkerPool;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A reusable latch for holding an operator mid-transform.
#[derive(Debug, Default)]
struct Gate(AtomicBool);

impl Gate {
    fn open(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn wait_open(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.is_open() {
            assert!(Instant::now() < deadline, "gate never opened");
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Test operator that records executions and cancel requests, optionally
/// failing or blocking on a gate until released (or canceled).
#[derive(Debug)]
struct ProbeOperator {
    name: String,
    flag: CancelFlag,
    executions: AtomicUsize,
    cancel_requests: AtomicUsize,
    fail: bool,
    hold: Option<Arc<Gate>>,
    started: Arc<Gate>,
}

impl ProbeOperator {
    fn ok(name: &str) -> Arc<Self> {
        Self::build(name, false, None)
    }

    fn failing(name: &str) -> Arc<Self> {
        Self::build(name, true, None)
    }

    fn holding(name: &str, hold: Arc<Gate>) -> Arc<Self> {
        Self::build(name, false, Some(hold))
    }

    fn build(name: &str, fail: bool, hold: Option<Arc<Gate>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            flag: CancelFlag::new(),
            executions: AtomicUsize::new(0),
            cancel_requests: AtomicUsize::new(0),
            fail,
            hold,
            started: Arc::new(Gate::default()),
        })
    }

    fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn cancel_requests(&self) -> usize {
        self.cancel_requests.load(Ordering::SeqCst)
    }
}

impl Operator<Vec<String>> for ProbeOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset_state(&self) {
        self.flag.reset();
    }

    fn transform(&self, artifact: &DataArtifact<Vec<String>>) -> TransformOutcome {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.started.open();

        if let Some(hold) = &self.hold {
            while !hold.is_open() {
                if self.flag.is_canceled() {
                    return TransformOutcome::Canceled;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        if self.flag.is_canceled() {
            return TransformOutcome::Canceled;
        }
        if self.fail {
            return TransformOutcome::Error;
        }
        artifact.update(|log| log.push(self.name.clone()));
        TransformOutcome::Complete
    }

    fn request_cancel(&self) {
        self.cancel_requests.fetch_add(1, Ordering::SeqCst);
        self.flag.request();
    }

    fn is_canceled(&self) -> bool {
        self.flag.is_canceled()
    }

    fn duplicate(&self) -> Arc<dyn Operator<Vec<String>>> {
        Self::build(&self.name, self.fail, self.hold.clone())
    }
}

fn as_ops(probes: &[&Arc<ProbeOperator>]) -> Vec<Arc<dyn Operator<Vec<String>>>> {
    probes
        .iter()
        .map(|probe| Arc::clone(*probe) as Arc<dyn Operator<Vec<String>>>)
        .collect()
}

#[tokio::test]
async fn test_all_stages_succeed_in_order() {
    let pool = WorkerPool::new(1);
    let (a, b, c) = (
        ProbeOperator::ok("a"),
        ProbeOperator::ok("b"),
        ProbeOperator::ok("c"),
    );
    let observer = Arc::new(CollectingObserver::new());

    let handle = engine::run_on(Vec::new(), as_ops(&[&a, &b, &c]), pool);
    handle.observe(Arc::clone(&observer) as Arc<dyn RunObserver>);

    assert_eq!(handle.wait().await, RunOutcome::Finished { success: true });
    assert_eq!(handle.result().snapshot(), vec!["a", "b", "c"]);
    assert_eq!(observer.events(), vec![RunOutcome::Finished { success: true }]);
    assert_eq!(a.executions(), 1);
    assert_eq!(b.executions(), 1);
    assert_eq!(c.executions(), 1);

    let names: Vec<String> = handle
        .operators()
        .iter()
        .map(|op| op.name().to_string())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(handle.finished_operators().len(), 3);
}

#[tokio::test]
async fn test_error_stops_pipeline_at_failing_stage() {
    let pool = WorkerPool::new(1);
    let (a, b, c) = (
        ProbeOperator::ok("a"),
        ProbeOperator::failing("b"),
        ProbeOperator::ok("c"),
    );
    let observer = Arc::new(CollectingObserver::new());

    let handle = engine::run_on(Vec::new(), as_ops(&[&a, &b, &c]), pool);
    handle.observe(Arc::clone(&observer) as Arc<dyn RunObserver>);

    assert_eq!(handle.wait().await, RunOutcome::Finished { success: false });
    // Exactly two stages executed; the stage after the error never ran.
    assert_eq!(a.executions(), 1);
    assert_eq!(b.executions(), 1);
    assert_eq!(c.executions(), 0);
    assert_eq!(handle.result().snapshot(), vec!["a"]);
    assert_eq!(observer.events(), vec![RunOutcome::Finished { success: false }]);

    // Appending after the failure is rejected.
    let d = ProbeOperator::ok("d");
    assert!(!handle.add_operator(Arc::clone(&d) as Arc<dyn Operator<Vec<String>>>));
    assert_eq!(d.executions(), 0);
}

#[tokio::test]
async fn test_cancel_before_first_stage_starts() {
    let pool = WorkerPool::new(1);
    let gate = Arc::new(Gate::default());
    let a = ProbeOperator::ok("a");
    let observer = Arc::new(CollectingObserver::new());

    // Occupy the only worker so the first stage stays revocable.
    let blocker = Arc::clone(&gate);
    pool.submit(move || blocker.wait_open());

    let handle = engine::run_on(Vec::new(), as_ops(&[&a]), Arc::clone(&pool));
    handle.observe(Arc::clone(&observer) as Arc<dyn RunObserver>);
    handle.cancel();
    gate.open();

    assert_eq!(handle.wait().await, RunOutcome::Canceled);
    assert_eq!(a.executions(), 0);
    assert_eq!(observer.events(), vec![RunOutcome::Canceled]);
}

#[tokio::test]
async fn test_cancel_while_stage_is_executing() {
    let pool = WorkerPool::new(1);
    let hold = Arc::new(Gate::default());
    let a = ProbeOperator::holding("a", Arc::clone(&hold));
    let b = ProbeOperator::ok("b");
    let observer = Arc::new(CollectingObserver::new());

    let handle = engine::run_on(Vec::new(), as_ops(&[&a, &b]), pool);
    handle.observe(Arc::clone(&observer) as Arc<dyn RunObserver>);

    a.started.wait_open();
    assert!(handle.is_running());
    handle.cancel();

    assert_eq!(handle.wait().await, RunOutcome::Canceled);
    assert_eq!(a.cancel_requests(), 1);
    assert_eq!(b.executions(), 0);
    assert_eq!(observer.events(), vec![RunOutcome::Canceled]);
    assert!(!handle.is_running());
}

#[tokio::test]
async fn test_selective_cancel_of_queued_stage() {
    let pool = WorkerPool::new(1);
    let hold = Arc::new(Gate::default());
    let a = ProbeOperator::holding("a", Arc::clone(&hold));
    let b = ProbeOperator::ok("b");
    let c = ProbeOperator::ok("c");

    let handle = engine::run_on(Vec::new(), as_ops(&[&a, &b, &c]), pool);
    a.started.wait_open();

    // b has not started: it can be removed without touching the run.
    let removed = handle.cancel_operator(&(Arc::clone(&b) as Arc<dyn Operator<Vec<String>>>));
    assert!(removed);
    assert!(handle.is_running());

    hold.open();
    assert_eq!(handle.wait().await, RunOutcome::Finished { success: true });
    assert_eq!(handle.result().snapshot(), vec!["a", "c"]);
    assert_eq!(b.executions(), 0);

    let names: Vec<String> = handle
        .operators()
        .iter()
        .map(|op| op.name().to_string())
        .collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[tokio::test]
async fn test_selective_cancel_of_in_flight_stage_cancels_run() {
    let pool = WorkerPool::new(1);
    let hold = Arc::new(Gate::default());
    let a = ProbeOperator::holding("a", Arc::clone(&hold));
    let b = ProbeOperator::ok("b");
    let observer = Arc::new(CollectingObserver::new());

    let handle = engine::run_on(Vec::new(), as_ops(&[&a, &b]), pool);
    handle.observe(Arc::clone(&observer) as Arc<dyn RunObserver>);
    a.started.wait_open();

    let removed = handle.cancel_operator(&(Arc::clone(&a) as Arc<dyn Operator<Vec<String>>>));
    assert!(!removed);

    assert_eq!(handle.wait().await, RunOutcome::Canceled);
    assert_eq!(a.cancel_requests(), 1);
    assert_eq!(b.executions(), 0);
    // Exactly one terminal notification, despite the degraded cancel.
    assert_eq!(observer.events(), vec![RunOutcome::Canceled]);
}

#[tokio::test]
async fn test_add_operator_while_running() {
    let pool = WorkerPool::new(1);
    let hold = Arc::new(Gate::default());
    let a = ProbeOperator::holding("a", Arc::clone(&hold));
    let d = ProbeOperator::ok("d");

    let handle = engine::run_on(Vec::new(), as_ops(&[&a]), pool);
    a.started.wait_open();

    assert!(handle.add_operator(Arc::clone(&d) as Arc<dyn Operator<Vec<String>>>));
    hold.open();

    assert_eq!(handle.wait().await, RunOutcome::Finished { success: true });
    // The appended operator executed after all previously queued ones.
    assert_eq!(handle.result().snapshot(), vec!["a", "d"]);
    assert_eq!(handle.operators().len(), 2);
}

#[tokio::test]
async fn test_observer_attached_after_completion_is_replayed() {
    let pool = WorkerPool::new(1);
    let a = ProbeOperator::ok("a");

    let handle = engine::run_on(Vec::new(), as_ops(&[&a]), pool);
    assert_eq!(handle.wait().await, RunOutcome::Finished { success: true });

    let observer = Arc::new(CollectingObserver::new());
    handle.observe(Arc::clone(&observer) as Arc<dyn RunObserver>);
    assert_eq!(observer.events(), vec![RunOutcome::Finished { success: true }]);
}

#[tokio::test]
async fn test_panicking_operator_fails_the_run() {
    let pool = WorkerPool::new(1);
    let explode = FnOperator::new("explode", |_: &DataArtifact<Vec<String>>, _| -> Result<(), StageError> {
        panic!("transform blew up");
    });
    let after = ProbeOperator::ok("after");

    let handle = engine::run_on(
        Vec::new(),
        vec![
            explode as Arc<dyn Operator<Vec<String>>>,
            Arc::clone(&after) as Arc<dyn Operator<Vec<String>>>,
        ],
        pool,
    );

    assert_eq!(handle.wait().await, RunOutcome::Finished { success: false });
    assert_eq!(after.executions(), 0);
}

#[tokio::test]
async fn test_rerun_after_cancel_with_same_operators() {
    let pool = WorkerPool::new(1);
    let hold = Arc::new(Gate::default());
    let a = ProbeOperator::ok("a");
    let b = ProbeOperator::holding("b", Arc::clone(&hold));

    let first = engine::run_on(Vec::new(), as_ops(&[&a, &b]), Arc::clone(&pool));
    b.started.wait_open();
    first.cancel();
    assert_eq!(first.wait().await, RunOutcome::Canceled);
    assert!(b.is_canceled());

    // Re-running resets the stale cancel flag; open the gate so b can
    // finish this time.
    hold.open();
    let second = engine::run_on(Vec::new(), as_ops(&[&a, &b]), pool);
    assert_eq!(second.wait().await, RunOutcome::Finished { success: true });
    assert_eq!(second.result().snapshot(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_independent_runs_execute_concurrently() {
    let pool = WorkerPool::new(2);
    let (hold_one, hold_two) = (Arc::new(Gate::default()), Arc::new(Gate::default()));
    let one = ProbeOperator::holding("one", Arc::clone(&hold_one));
    let two = ProbeOperator::holding("two", Arc::clone(&hold_two));

    let first = engine::run_on(Vec::new(), as_ops(&[&one]), Arc::clone(&pool));
    let second = engine::run_on(Vec::new(), as_ops(&[&two]), pool);

    // Both stages are in flight at once; neither gate has opened yet.
    one.started.wait_open();
    two.started.wait_open();
    hold_one.open();
    hold_two.open();

    assert_eq!(first.wait().await, RunOutcome::Finished { success: true });
    assert_eq!(second.wait().await, RunOutcome::Finished { success: true });
}

#[tokio::test]
async fn test_duplicate_operators_run_independently() {
    let pool = WorkerPool::new(1);
    let original = ProbeOperator::ok("copyable");
    original.request_cancel();

    let copy = original.duplicate();
    assert!(!copy.is_canceled());

    let handle = engine::run_on(Vec::new(), vec![copy], pool);
    assert_eq!(handle.wait().await, RunOutcome::Finished { success: true });
    // The original's instrumentation is untouched by the copy's run.
    assert_eq!(original.executions(), 0);
}
