//! Deterministic, pure planning logic.
//!
//! Core modules are free of I/O side effects. They operate on in-memory
//! snapshots and return deterministic outputs suitable for tests.

pub mod agents;
pub mod causal;
pub mod domain;
pub mod engine;
pub mod graph;
pub mod invariants;
pub mod policy;
pub mod projection;
pub mod search;
pub mod state;
pub mod task;
