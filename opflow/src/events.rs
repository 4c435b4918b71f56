//! Run observer trait and implementations.

use crate::core::RunOutcome;
use tracing::{debug, info, Level};

/// Trait for observers of a run's terminal notification.
///
/// Exactly one of `on_finished` / `on_canceled` is delivered per run,
/// including to observers attached after the run already reached a
/// terminal state (the notification is buffered and replayed).
pub trait RunObserver: Send + Sync {
    /// The run processed all of its stages; `success` is false if a
    /// stage reported an error.
    fn on_finished(&self, success: bool);

    /// The run was canceled.
    fn on_canceled(&self);
}

/// An observer that discards all notifications.
///
/// Used as the default when the caller only polls the handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RunObserver for NoOpObserver {
    fn on_finished(&self, _success: bool) {
        // Intentionally empty
    }

    fn on_canceled(&self) {
        // Intentionally empty
    }
}

/// An observer that logs notifications using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    /// The log level to use.
    level: Level,
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingObserver {
    /// Creates a new logging observer with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging observer.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log(&self, outcome: RunOutcome) {
        match self.level {
            Level::DEBUG => debug!(outcome = %outcome, "run reached terminal state"),
            _ => info!(outcome = %outcome, "run reached terminal state"),
        }
    }
}

impl RunObserver for LoggingObserver {
    fn on_finished(&self, success: bool) {
        self.log(RunOutcome::Finished { success });
    }

    fn on_canceled(&self) {
        self.log(RunOutcome::Canceled);
    }
}

/// A collecting observer for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: parking_lot::RwLock<Vec<RunOutcome>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected notifications in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<RunOutcome> {
        self.events.read().clone()
    }

    /// Returns the number of collected notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no notification has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl RunObserver for CollectingObserver {
    fn on_finished(&self, success: bool) {
        self.events.write().push(RunOutcome::Finished { success });
    }

    fn on_canceled(&self) {
        self.events.write().push(RunOutcome::Canceled);
    }
}
