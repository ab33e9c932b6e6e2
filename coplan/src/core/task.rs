//! Task specifications and the queue entries built from them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A task as written by domain callbacks: a name plus positional parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub params: Vec<String>,
}

impl TaskSpec {
    pub fn new<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// A task without parameters.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

/// Index of an operator inside its agent's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorId(pub(crate) usize);

/// Index of a method set inside its agent's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSetId(pub(crate) usize);

/// Resolved kind of a task name, fixed when the task is instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Primitive(OperatorId),
    Abstract(MethodSetId),
}

/// Run-unique, monotonically increasing task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Entry of an agent's pending queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub params: Vec<String>,
    pub agent: String,
    pub kind: TaskKind,
    /// Abstract task this one was decomposed from.
    pub why: Option<Arc<Task>>,
    /// Index of the method of `why` that produced this task.
    pub decompo_number: Option<usize>,
    /// Declared method count; zero for operators.
    pub number_of_decompo: usize,
    /// Subtask lists produced when this abstract task was expanded.
    pub how: Vec<Vec<TaskSpec>>,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}({})", self.id, self.name, self.params.join(", "))
    }
}
