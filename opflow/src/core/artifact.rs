//! The shared data artifact operators transform in place.

use parking_lot::Mutex;

/// The mutable payload a pipeline run transforms.
///
/// One artifact is shared by reference across all stages of a run. The
/// engine guarantees at most one stage is executing per run, so the inner
/// lock is uncontended during a transform; it exists to make shared access
/// sound and to let callers inspect the payload after the run finishes.
#[derive(Debug, Default)]
pub struct DataArtifact<T> {
    inner: Mutex<T>,
}

impl<T> DataArtifact<T> {
    /// Wraps a payload in an artifact.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Mutates the payload in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Reads the payload without mutating it.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Replaces the payload, returning the previous value.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut self.inner.lock(), value)
    }

    /// Consumes the artifact and returns the payload.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Clone> DataArtifact<T> {
    /// Returns a clone of the current payload.
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.inner.lock().clone()
    }
}
