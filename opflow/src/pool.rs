//! Process-wide bounded pool of worker threads.
//!
//! The pool is the sole execution resource shared by all runs. It is
//! deliberately under-subscribed (half the available cores) so the
//! interactive thread and other subsystems keep execution headroom.
//! Jobs run in FIFO submission order with no further fairness guarantees;
//! each run only ever has one job in flight, so cross-run ordering affects
//! latency, not correctness.

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Environment variable overriding the global pool's thread count.
pub const WORKER_THREADS_ENV: &str = "OPFLOW_WORKER_THREADS";

/// Identifies a submitted job so it can be revoked before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobTicket(u64);

type Job = Box<dyn FnOnce() + Send>;

struct QueuedJob {
    ticket: JobTicket,
    job: Job,
}

struct PoolState {
    queue: VecDeque<QueuedJob>,
    stop: bool,
}

/// The queue workers block on. Workers hold this, not the pool itself, so
/// dropping the last pool handle can signal them to exit.
struct Shared {
    state: Mutex<PoolState>,
    work_available: Condvar,
}

/// A fixed-size pool of named worker threads.
///
/// Obtain the process-wide instance with [`WorkerPool::global`]; dedicated
/// pools (for embedding or tests) can be built with [`WorkerPool::new`].
/// The submitter owns job lifetime; the pool never retains a job after it
/// ran or was revoked. Dropping the last handle to a dedicated pool stops
/// its workers once the remaining queued jobs have drained.
pub struct WorkerPool {
    shared: Arc<Shared>,
    next_ticket: AtomicU64,
    threads: usize,
}

static GLOBAL: Lazy<Arc<WorkerPool>> = Lazy::new(|| {
    let threads = configured_thread_count();
    info!(threads, "initializing global worker pool");
    WorkerPool::new(threads)
});

/// Pool size for the global pool: `max(1, available_parallelism / 2)`,
/// overridable through `OPFLOW_WORKER_THREADS`.
fn configured_thread_count() -> usize {
    if let Ok(value) = std::env::var(WORKER_THREADS_ENV) {
        match value.parse::<usize>() {
            Ok(n) if n > 0 => return n,
            _ => warn!(%value, "ignoring invalid {WORKER_THREADS_ENV}"),
        }
    }
    std::thread::available_parallelism().map_or(1, |n| (n.get() / 2).max(1))
}

impl WorkerPool {
    /// Creates a dedicated pool with the given number of worker threads
    /// (clamped to at least one).
    ///
    /// # Panics
    ///
    /// Panics if no worker thread at all could be spawned; a pool without
    /// workers would accept jobs that can never run.
    #[must_use]
    pub fn new(threads: usize) -> Arc<Self> {
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                stop: false,
            }),
            work_available: Condvar::new(),
        });

        let mut spawned = 0;
        for index in 0..threads {
            let worker = Arc::clone(&shared);
            let result = std::thread::Builder::new()
                .name(format!("opflow-worker-{index}"))
                .spawn(move || worker_loop(&worker));
            match result {
                Ok(_) => spawned += 1,
                Err(err) => error!(index, %err, "failed to spawn worker thread"),
            }
        }
        assert!(spawned > 0, "no worker threads could be spawned");

        Arc::new(Self {
            shared,
            next_ticket: AtomicU64::new(0),
            threads: spawned,
        })
    }

    /// Returns the process-wide pool, initializing it on first use.
    pub fn global() -> &'static Arc<Self> {
        &GLOBAL
    }

    /// Returns the number of worker threads in this pool.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Enqueues a job for execution and returns its revocation ticket.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> JobTicket {
        let ticket = JobTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        {
            let mut state = self.shared.state.lock();
            state.queue.push_back(QueuedJob {
                ticket,
                job: Box::new(job),
            });
        }
        self.shared.work_available.notify_one();
        ticket
    }

    /// Removes a job from the queue before it begins executing.
    ///
    /// Returns true if the job was still queued and has been discarded;
    /// false if it is already executing or has finished.
    pub fn try_revoke(&self, ticket: JobTicket) -> bool {
        let mut state = self.shared.state.lock();
        if let Some(position) = state
            .queue
            .iter()
            .position(|queued| queued.ticket == ticket)
        {
            state.queue.remove(position);
            debug!(?ticket, "revoked queued job");
            true
        } else {
            false
        }
    }

    /// Returns the number of jobs waiting to start.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers drain the remaining queue, then exit. They are not
        // joined: the last pool handle can be dropped from a worker
        // thread (a finishing job releasing its run), where a join would
        // deadlock.
        self.shared.state.lock().stop = true;
        self.shared.work_available.notify_all();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let queued = {
            let mut state = shared.state.lock();
            loop {
                if let Some(queued) = state.queue.pop_front() {
                    break Some(queued);
                }
                if state.stop {
                    break None;
                }
                shared.work_available.wait(&mut state);
            }
        };
        let Some(queued) = queued else {
            return;
        };
        // Jobs convert their own failures into outcomes; nothing should
        // unwind out of here.
        (queued.job)();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("queued", &self.queued_len())
            .finish()
    }
}
