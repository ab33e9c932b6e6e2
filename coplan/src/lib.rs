//! Hierarchical task-network planning for a controlled agent acting next to an
//! uncontrolled one.
//!
//! The planner decomposes the controlled agent's tasks, predicts every
//! possible response of the other agent after each action, and keeps the
//! branches that complete the controlled agent's queue. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (search, projection, policy
//!   selection, causal links). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (configuration and export files).
//!
//! [`planning`] coordinates the core passes against a [`io::config::PlannerConfig`].

pub mod core;
pub mod error;
pub mod io;
pub mod logging;
pub mod planning;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
