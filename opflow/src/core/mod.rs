//! Core types shared across the engine.
//!
//! This module provides:
//! - The data artifact that operators transform in place
//! - Outcome and state enums for stages and runs

mod artifact;
mod outcome;

pub use artifact::DataArtifact;
pub use outcome::{RunOutcome, RunState, TransformOutcome};
