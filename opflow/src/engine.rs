//! Engine entry point: turn an artifact and an operator list into a
//! started run.

use crate::handle::RunHandle;
use crate::operator::Operator;
use crate::pool::WorkerPool;
use crate::run::Run;
use std::sync::Arc;
use tracing::debug;

/// Runs an ordered operator pipeline against an artifact.
///
/// Every operator's state is reset first, so the same operator list can be
/// reused across invocations. The returned handle is live before the first
/// stage executes.
pub fn run<T: Send + 'static>(
    artifact: T,
    operators: Vec<Arc<dyn Operator<T>>>,
) -> RunHandle<T> {
    run_on(artifact, operators, Arc::clone(WorkerPool::global()))
}

/// Runs a single-operator pipeline. Sugar for a one-element list.
pub fn run_single<T: Send + 'static>(artifact: T, operator: Arc<dyn Operator<T>>) -> RunHandle<T> {
    run(artifact, vec![operator])
}

/// Runs a pipeline on a dedicated worker pool instead of the global one.
pub fn run_on<T: Send + 'static>(
    artifact: T,
    operators: Vec<Arc<dyn Operator<T>>>,
    pool: Arc<WorkerPool>,
) -> RunHandle<T> {
    for op in &operators {
        op.reset_state();
    }
    debug!(stages = operators.len(), "starting pipeline run");

    Run::with_pool(artifact, operators, pool).start()
}
