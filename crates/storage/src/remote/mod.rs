//! Remote store implementations.
//!
//! - [`rest::RestRemoteStore`]: the hosted backend over its PostgREST API
//! - [`memory::MemoryRemoteStore`]: in-process backend with the same contract

pub mod memory;
pub mod rest;

pub use memory::MemoryRemoteStore;
pub use rest::RestRemoteStore;
