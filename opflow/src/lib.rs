//! # Opflow
//!
//! An operator-pipeline execution engine.
//!
//! Opflow runs an ordered sequence of data-transforming operators against a
//! single shared data artifact, off the caller's thread, with support for:
//!
//! - **Sequential staging**: one stage in flight per run, runs in parallel
//!   with each other on a bounded worker pool
//! - **Cooperative cancellation**: cancel a whole run or a single
//!   not-yet-started stage; in-flight operators observe a cancel flag
//! - **Live pipelines**: append operators while a run is in progress
//! - **Terminal notification**: exactly one finished/canceled event per run,
//!   delivered to observers and to an awaitable handle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use opflow::prelude::*;
//!
//! let double = FnOperator::new("double", |artifact: &DataArtifact<i64>, _flag| {
//!     artifact.update(|v| *v *= 2);
//!     Ok(())
//! });
//!
//! let handle = opflow::engine::run_single(21, double);
//! let outcome = handle.wait().await;
//! assert_eq!(outcome, RunOutcome::Finished { success: true });
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod core;
pub mod engine;
pub mod errors;
pub mod events;
pub mod handle;
pub mod observability;
pub mod operator;
pub mod pool;
pub mod run;
pub mod task;

#[cfg(test)]
mod integration_tests;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancelFlag;
    pub use crate::core::{DataArtifact, RunOutcome, RunState, TransformOutcome};
    pub use crate::engine::{run, run_single};
    pub use crate::errors::StageError;
    pub use crate::events::{CollectingObserver, LoggingObserver, NoOpObserver, RunObserver};
    pub use crate::handle::RunHandle;
    pub use crate::operator::{FnOperator, NoOpOperator, Operator};
    pub use crate::pool::WorkerPool;
    pub use crate::run::Run;
}
