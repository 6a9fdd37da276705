//! Business rules that move a run through its lifecycle.
//!
//! The [`RunController`] owns the teacher gate: approving a run executes its
//! stored prompt through a [`GenerationClient`] and records the outcome,
//! rejecting it fails the run without any external call. Every transition
//! is checked against the table in [`state`] and leaves exactly one audit
//! event behind.

mod controller;
mod error;
pub mod generation;
pub mod state;

pub use controller::{RunController, RunOutcome, NO_INPUT_NOTE, REJECTED_NOTE, STUCK_NOTE};
pub use error::LifecycleError;
pub use generation::{
    ExecutionMode, Generation, GenerationClient, GenerationError, UnconfiguredClient,
};

#[cfg(feature = "anthropic")]
pub use generation::AnthropicClient;
