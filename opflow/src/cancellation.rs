//! Cooperative cancellation flag for operators.
//!
//! Cancellation is a request, not a guarantee of immediate halt: the engine
//! raises the flag and the operator's transform is expected to poll it and
//! stop at a convenient point. Nothing in the engine preempts a running
//! transform.

use std::sync::atomic::{AtomicBool, Ordering};

/// An observable cancellation flag.
///
/// Raising the flag is idempotent. `reset` rearms the flag so the owning
/// operator can be reused across runs.
#[derive(Debug, Default)]
pub struct CancelFlag {
    canceled: AtomicBool,
}

impl CancelFlag {
    /// Creates a new, unraised flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn request(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Clears the flag.
    pub fn reset(&self) {
        self.canceled.store(false, Ordering::SeqCst);
    }
}
