//! Fatal planning errors.
//!
//! Local search failures (an operator whose precondition does not hold, an
//! abstract task with no applicable method) are ordinary planning outcomes and
//! never surface here. Everything in [`PlanningError`] points at a bug in the
//! domain definition or in the caller's configuration.

use thiserror::Error;

use crate::core::graph::NodeId;

/// Errors that abort a planning run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("agent '{0}' is not declared")]
    UnknownAgent(String),

    #[error(
        "{origin} returned subtask '{task}' which is neither an operator nor a method of agent '{agent}'"
    )]
    UnknownTask {
        agent: String,
        task: String,
        origin: String,
    },

    #[error("method #{method} of task '{task}' (agent '{agent}') returned none; it must return a decomposition or inapplicable")]
    MethodReturnedNone {
        agent: String,
        task: String,
        method: usize,
    },

    #[error("task '{task}' of agent '{agent}' is declared both as an operator and as a method")]
    DuplicateTask { agent: String, task: String },

    #[error("operator '{operator}' of agent '{agent}' reported no cost and the cost table has no entry for it")]
    MissingCost { agent: String, operator: String },

    #[error("replaying '{operator}' of agent '{agent}' at node {node} failed its precondition")]
    ReplayFailed {
        agent: String,
        operator: String,
        node: NodeId,
    },
}

/// Convenience alias for core results.
pub type PlanningResult<T> = std::result::Result<T, PlanningError>;
