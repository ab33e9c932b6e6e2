//! Conditional policy synthesis over a solution graph.
//!
//! Costs are propagated bottom-up. The owner of a node decides how the costs
//! of its successors combine: successors of a controlled-agent node are
//! aggregated (mean by default), successors of an uncontrolled-agent node
//! (including BEGIN) are reduced to their minimum, and that node's successor
//! list is collapsed to the minimizing child. The resolved graph is
//! deterministic wherever the uncontrolled agent owns a node.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::agents::Agents;
use crate::core::domain::{Domain, OpResult};
use crate::core::graph::{BEGIN, IDLE, NodeId, PlanGraph, PlanNode, WAIT};
use crate::core::search::Roles;
use crate::error::{PlanningError, PlanningResult};

/// How successor costs combine below a controlled-agent node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Arithmetic mean over successors.
    #[default]
    Mean,
    /// Cheapest successor.
    Min,
}

impl Aggregation {
    pub fn combine(self, costs: &[f64]) -> f64 {
        if costs.is_empty() {
            return 0.0;
        }
        match self {
            Aggregation::Mean => costs.iter().sum::<f64>() / costs.len() as f64,
            Aggregation::Min => costs.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

/// Penalty for reaching an undesired joint state.
pub type StatePenalty = Arc<dyn Fn(&Agents) -> f64 + Send + Sync>;
/// Penalty for an undesired sequence, given the branch from BEGIN to a leaf.
pub type SequencePenalty = Arc<dyn Fn(&[&PlanNode]) -> f64 + Send + Sync>;

/// Costs and penalties used to score a solution graph.
#[derive(Clone, Default)]
pub struct CostModel {
    pub idle_cost: f64,
    pub wait_cost: f64,
    /// Cost of operators that report none themselves.
    pub table: HashMap<String, f64>,
    pub aggregation: Aggregation,
    state_penalties: Vec<StatePenalty>,
    sequence_penalties: Vec<SequencePenalty>,
}

impl CostModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state_penalty<F>(mut self, penalty: F) -> Self
    where
        F: Fn(&Agents) -> f64 + Send + Sync + 'static,
    {
        self.state_penalties.push(Arc::new(penalty));
        self
    }

    pub fn with_sequence_penalty<F>(mut self, penalty: F) -> Self
    where
        F: Fn(&[&PlanNode]) -> f64 + Send + Sync + 'static,
    {
        self.sequence_penalties.push(Arc::new(penalty));
        self
    }

    fn state_penalty(&self, agents: &Agents) -> f64 {
        self.state_penalties.iter().map(|check| check(agents)).sum()
    }

    fn sequence_penalty(&self, branch: &[&PlanNode]) -> f64 {
        self.sequence_penalties.iter().map(|check| check(branch)).sum()
    }
}

impl std::fmt::Debug for CostModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostModel")
            .field("idle_cost", &self.idle_cost)
            .field("wait_cost", &self.wait_cost)
            .field("table", &self.table)
            .field("aggregation", &self.aggregation)
            .field("state_penalties", &self.state_penalties.len())
            .field("sequence_penalties", &self.sequence_penalties.len())
            .finish()
    }
}

/// A resolved conditional policy.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Expected cost at BEGIN.
    pub cost: f64,
    /// Copy of the solution graph with uncontrolled-agent nodes collapsed.
    pub graph: PlanGraph,
    /// Total cost of every evaluated leaf, including ones collapsed away.
    pub leaf_costs: BTreeMap<NodeId, f64>,
}

impl Policy {
    pub fn root(&self) -> NodeId {
        self.graph.root()
    }

    /// Leaves still reachable in the resolved graph.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.graph.leaves(self.graph.root())
    }

    /// The resolved branch with the lowest leaf cost; earliest on ties.
    pub fn cheapest_branch(&self) -> Vec<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for leaf in self.leaves() {
            let cost = self.leaf_costs.get(&leaf).copied().unwrap_or(f64::INFINITY);
            if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                best = Some((leaf, cost));
            }
        }
        match best {
            Some((leaf, _)) => self.graph.branch_to(leaf),
            None => vec![self.graph.root()],
        }
    }
}

/// Score `graph` from the `initial` snapshot and resolve it into a policy.
///
/// `graph` itself is left untouched; collapsing happens on a copy.
pub fn select(
    domain: &Domain,
    initial: &Agents,
    graph: &PlanGraph,
    roles: Roles<'_>,
    costs: &CostModel,
) -> PlanningResult<Policy> {
    let mut selector = Selector {
        domain,
        roles,
        costs,
        graph: graph.clone(),
        trail: Vec::new(),
        leaf_costs: BTreeMap::new(),
    };
    let root = selector.graph.root();
    let cost = selector.explore(initial, root, 0.0)?;
    debug!(cost, leaves = selector.leaf_costs.len(), "policy selected");
    Ok(Policy {
        cost,
        graph: selector.graph,
        leaf_costs: selector.leaf_costs,
    })
}

struct Selector<'a> {
    domain: &'a Domain,
    roles: Roles<'a>,
    costs: &'a CostModel,
    graph: PlanGraph,
    trail: Vec<NodeId>,
    leaf_costs: BTreeMap<NodeId, f64>,
}

impl Selector<'_> {
    fn explore(&mut self, agents: &Agents, id: NodeId, accumulated: f64) -> PlanningResult<f64> {
        let node = self.graph[id].clone();
        let (after, step_cost) = self.replay(agents, &node)?;
        let penalty = if node.is_begin() {
            0.0
        } else {
            self.costs.state_penalty(&after)
        };
        let current = accumulated + step_cost + penalty;
        trace!(node = %node, step_cost, penalty, current, "explored");

        self.trail.push(id);
        let result = self.resolve(&after, &node, current);
        self.trail.pop();
        result
    }

    fn resolve(&mut self, after: &Agents, node: &PlanNode, current: f64) -> PlanningResult<f64> {
        if node.is_leaf() {
            let branch: Vec<&PlanNode> = self.trail.iter().map(|id| &self.graph[*id]).collect();
            let total = current + self.costs.sequence_penalty(&branch);
            self.leaf_costs.insert(node.id, total);
            return Ok(total);
        }

        let mut costs = Vec::with_capacity(node.next.len());
        for child in &node.next {
            costs.push(self.explore(after, *child, current)?);
        }

        if node.agent == self.roles.uncontrolled {
            let mut best = 0;
            for (index, cost) in costs.iter().enumerate().skip(1) {
                if *cost < costs[best] {
                    best = index;
                }
            }
            self.graph.set_next(node.id, vec![node.next[best]]);
            Ok(costs[best])
        } else if node.agent == self.roles.controlled {
            Ok(self.costs.aggregation.combine(&costs))
        } else {
            Err(PlanningError::UnknownAgent(node.agent.clone()))
        }
    }

    /// Apply `node` to a copy of `agents` and return its incurred cost.
    fn replay(&self, agents: &Agents, node: &PlanNode) -> PlanningResult<(Agents, f64)> {
        match node.name.as_str() {
            BEGIN => return Ok((agents.clone(), 0.0)),
            IDLE => return Ok((agents.clone(), self.costs.idle_cost)),
            WAIT => return Ok((agents.clone(), self.costs.wait_cost)),
            _ => {}
        }
        let operator = self
            .domain
            .agent(&node.agent)?
            .operator_named(&node.name)
            .ok_or_else(|| PlanningError::UnknownTask {
                agent: node.agent.clone(),
                task: node.name.clone(),
                origin: format!("plan node {}", node.id),
            })?;
        let mut next = agents.clone();
        let cost = match (operator.apply)(&mut next, &node.agent, &node.params) {
            OpResult::Inapplicable => {
                return Err(PlanningError::ReplayFailed {
                    agent: node.agent.clone(),
                    operator: node.name.clone(),
                    node: node.id,
                });
            }
            OpResult::Applied { cost: Some(cost) } => cost,
            OpResult::Applied { cost: None } => {
                self.costs
                    .table
                    .get(&node.name)
                    .copied()
                    .ok_or_else(|| PlanningError::MissingCost {
                        agent: node.agent.clone(),
                        operator: node.name.clone(),
                    })?
            }
        };
        Ok((next, cost))
    }
}
