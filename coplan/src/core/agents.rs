//! Joint snapshot of every agent's dynamic state.
//!
//! Snapshots are cloned at every branch point. World attributes share storage
//! until written (see [`WorldState`]), queues and plan histories are copied.

use std::collections::VecDeque;

use crate::core::domain::Domain;
use crate::core::graph::NodeId;
use crate::core::state::WorldState;
use crate::core::task::{Task, TaskId, TaskSpec};
use crate::error::{PlanningError, PlanningResult};

/// Dynamic state owned by one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    pub name: String,
    pub state: WorldState,
    /// Pending queue; the head is handled next.
    pub tasks: VecDeque<Task>,
    /// Executed actions in order, as plan-graph nodes.
    pub plan: Vec<NodeId>,
}

/// Every agent's state, queue and plan, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Agents {
    agents: Vec<AgentState>,
    next_task_id: u64,
}

impl Agents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` with its initial state, replacing the state if the agent
    /// already exists.
    pub fn set_state(&mut self, name: &str, state: WorldState) {
        match self.get_mut(name) {
            Some(agent) => agent.state = state,
            None => self.agents.push(AgentState {
                name: name.to_string(),
                state,
                tasks: VecDeque::new(),
                plan: Vec::new(),
            }),
        }
    }

    /// Append `specs` to the queue of `agent`, resolving each name against the
    /// domain.
    pub fn add_tasks<I>(&mut self, domain: &Domain, agent: &str, specs: I) -> PlanningResult<()>
    where
        I: IntoIterator<Item = TaskSpec>,
    {
        let mut resolved = Vec::new();
        for spec in specs {
            let id = TaskId(self.next_task_id);
            self.next_task_id += 1;
            resolved.push(domain.instantiate(agent, &spec, "initial tasks", id, None, None)?);
        }
        self.require_mut(agent)?.tasks.extend(resolved);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&AgentState> {
        self.agents.iter().find(|agent| agent.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AgentState> {
        self.agents.iter_mut().find(|agent| agent.name == name)
    }

    pub fn state(&self, name: &str) -> Option<&WorldState> {
        self.get(name).map(|agent| &agent.state)
    }

    /// Apply `update` to every agent's view of the world.
    pub fn update_all(&mut self, mut update: impl FnMut(&mut WorldState)) {
        for agent in &mut self.agents {
            update(&mut agent.state);
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.agents.iter().map(|agent| agent.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentState> + '_ {
        self.agents.iter()
    }

    /// First task id not yet handed out by [`Agents::add_tasks`].
    pub fn next_task_id(&self) -> u64 {
        self.next_task_id
    }

    pub fn require(&self, name: &str) -> PlanningResult<&AgentState> {
        self.get(name)
            .ok_or_else(|| PlanningError::UnknownAgent(name.to_string()))
    }

    pub fn require_mut(&mut self, name: &str) -> PlanningResult<&mut AgentState> {
        self.get_mut(name)
            .ok_or_else(|| PlanningError::UnknownAgent(name.to_string()))
    }
}
