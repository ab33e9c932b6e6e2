//! Per-agent registries of operators, methods and triggers.
//!
//! The domain is immutable once the search starts; snapshots of dynamic
//! state live in [`Agents`]. Task names are resolved to a closed
//! [`TaskKind`] when a task is instantiated, so an unknown name is reported
//! as a configuration error instead of silently failing a branch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::agents::Agents;
use crate::core::task::{MethodSetId, OperatorId, Task, TaskId, TaskKind, TaskSpec};
use crate::error::{PlanningError, PlanningResult};

/// Outcome of invoking an operator callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpResult {
    /// The precondition does not hold.
    Inapplicable,
    /// Effects were applied. `cost: None` defers to the flat cost table.
    Applied { cost: Option<f64> },
}

impl OpResult {
    pub fn cost(cost: f64) -> Self {
        OpResult::Applied { cost: Some(cost) }
    }

    /// Applied without an explicit cost.
    pub fn from_table() -> Self {
        OpResult::Applied { cost: None }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, OpResult::Applied { .. })
    }
}

/// Outcome of invoking a method callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decomposition {
    Inapplicable,
    Subtasks(Vec<TaskSpec>),
    /// Mutually exclusive subtask lists, each yielding its own successor.
    Alternatives(Vec<Vec<TaskSpec>>),
}

impl Decomposition {
    pub fn into_alternatives(self) -> Vec<Vec<TaskSpec>> {
        match self {
            Decomposition::Inapplicable => Vec::new(),
            Decomposition::Subtasks(subtasks) => vec![subtasks],
            Decomposition::Alternatives(alternatives) => alternatives,
        }
    }
}

/// `(agents, own name, params)`; mutates `agents` only when applicable.
pub type OperatorFn = Arc<dyn Fn(&mut Agents, &str, &[String]) -> OpResult + Send + Sync>;
/// `(agents, own name, params)`; `None` is a domain-authoring bug.
pub type MethodFn = Arc<dyn Fn(&Agents, &str, &[String]) -> Option<Decomposition> + Send + Sync>;
/// `(agents, own name)`; `Some` spawns tasks at the front of the queue.
pub type TriggerFn = Arc<dyn Fn(&Agents, &str) -> Option<Vec<TaskSpec>> + Send + Sync>;

pub struct Operator {
    pub name: String,
    pub apply: OperatorFn,
}

pub struct MethodSet {
    pub task: String,
    pub methods: Vec<MethodFn>,
}

/// Static definition of one agent.
#[derive(Default)]
pub struct AgentDef {
    pub name: String,
    operators: Vec<Operator>,
    method_sets: Vec<MethodSet>,
    triggers: Vec<TriggerFn>,
    index: HashMap<String, TaskKind>,
}

impl AgentDef {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn resolve(&self, task: &str) -> Option<TaskKind> {
        self.index.get(task).copied()
    }

    pub fn operator(&self, id: OperatorId) -> &Operator {
        &self.operators[id.0]
    }

    pub fn method_set(&self, id: MethodSetId) -> &MethodSet {
        &self.method_sets[id.0]
    }

    pub fn operator_named(&self, name: &str) -> Option<&Operator> {
        match self.resolve(name)? {
            TaskKind::Primitive(id) => Some(self.operator(id)),
            TaskKind::Abstract(_) => None,
        }
    }

    pub fn triggers(&self) -> &[TriggerFn] {
        &self.triggers
    }

    pub fn operator_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.operators.iter().map(|op| op.name.as_str())
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.method_sets.iter().map(|set| set.task.as_str())
    }
}

impl fmt::Debug for AgentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDef")
            .field("name", &self.name)
            .field("operators", &self.operator_names().collect::<Vec<_>>())
            .field("methods", &self.method_names().collect::<Vec<_>>())
            .field("triggers", &self.triggers.len())
            .finish()
    }
}

/// Registry of every agent's operators, methods and triggers.
#[derive(Debug, Default)]
pub struct Domain {
    agents: Vec<AgentDef>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_operator<F>(&mut self, agent: &str, name: &str, apply: F) -> PlanningResult<()>
    where
        F: Fn(&mut Agents, &str, &[String]) -> OpResult + Send + Sync + 'static,
    {
        let def = self.entry(agent);
        match def.index.get(name) {
            Some(TaskKind::Abstract(_)) => {
                return Err(PlanningError::DuplicateTask {
                    agent: agent.to_string(),
                    task: name.to_string(),
                });
            }
            Some(TaskKind::Primitive(id)) => {
                def.operators[id.0].apply = Arc::new(apply);
            }
            None => {
                let id = OperatorId(def.operators.len());
                def.operators.push(Operator {
                    name: name.to_string(),
                    apply: Arc::new(apply),
                });
                def.index.insert(name.to_string(), TaskKind::Primitive(id));
            }
        }
        Ok(())
    }

    /// Append one method to the method set of `task`; order of declaration is
    /// the order in which methods are tried.
    pub fn declare_method<F>(&mut self, agent: &str, task: &str, method: F) -> PlanningResult<()>
    where
        F: Fn(&Agents, &str, &[String]) -> Option<Decomposition> + Send + Sync + 'static,
    {
        let def = self.entry(agent);
        match def.index.get(task) {
            Some(TaskKind::Primitive(_)) => Err(PlanningError::DuplicateTask {
                agent: agent.to_string(),
                task: task.to_string(),
            }),
            Some(TaskKind::Abstract(id)) => {
                def.method_sets[id.0].methods.push(Arc::new(method));
                Ok(())
            }
            None => {
                let id = MethodSetId(def.method_sets.len());
                def.method_sets.push(MethodSet {
                    task: task.to_string(),
                    methods: vec![Arc::new(method)],
                });
                def.index.insert(task.to_string(), TaskKind::Abstract(id));
                Ok(())
            }
        }
    }

    pub fn declare_trigger<F>(&mut self, agent: &str, trigger: F)
    where
        F: Fn(&Agents, &str) -> Option<Vec<TaskSpec>> + Send + Sync + 'static,
    {
        self.entry(agent).triggers.push(Arc::new(trigger));
    }

    pub fn agent(&self, name: &str) -> PlanningResult<&AgentDef> {
        self.agents
            .iter()
            .find(|def| def.name == name)
            .ok_or_else(|| PlanningError::UnknownAgent(name.to_string()))
    }

    /// Build a queue entry for `spec`, resolving its kind against `agent`.
    pub fn instantiate(
        &self,
        agent: &str,
        spec: &TaskSpec,
        origin: &str,
        id: TaskId,
        why: Option<Arc<Task>>,
        decompo_number: Option<usize>,
    ) -> PlanningResult<Task> {
        let def = self.agent(agent)?;
        let kind = def
            .resolve(&spec.name)
            .ok_or_else(|| PlanningError::UnknownTask {
                agent: agent.to_string(),
                task: spec.name.clone(),
                origin: origin.to_string(),
            })?;
        let number_of_decompo = match kind {
            TaskKind::Primitive(_) => 0,
            TaskKind::Abstract(set) => def.method_set(set).methods.len(),
        };
        Ok(Task {
            id,
            name: spec.name.clone(),
            params: spec.params.clone(),
            agent: agent.to_string(),
            kind,
            why,
            decompo_number,
            number_of_decompo,
            how: Vec::new(),
        })
    }

    /// Human-readable listing of every agent's operators and methods.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for def in &self.agents {
            out.push_str(&format!("agent {}\n", def.name));
            let operators: Vec<&str> = def.operator_names().collect();
            out.push_str(&format!("  operators: {}\n", operators.join(", ")));
            for set in &def.method_sets {
                out.push_str(&format!(
                    "  method {}: {} decomposition(s)\n",
                    set.task,
                    set.methods.len()
                ));
            }
        }
        out
    }

    fn entry(&mut self, agent: &str) -> &mut AgentDef {
        let pos = match self.agents.iter().position(|def| def.name == agent) {
            Some(pos) => pos,
            None => {
                self.agents.push(AgentDef::new(agent));
                self.agents.len() - 1
            }
        };
        &mut self.agents[pos]
    }
}
