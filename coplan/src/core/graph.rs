//! Arena of plan nodes forming the shared decision graph.
//!
//! Node 0 is the BEGIN root. Every node is created with its predecessor
//! already known, and the predecessor's successor list is updated at the same
//! time, so both directions stay consistent without a separate threading pass.
//! Depth-first branches that share an action prefix share the nodes of that
//! prefix because the prefix is only ever created once.

use std::collections::HashSet;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::task::{Task, TaskId};

pub const BEGIN: &str = "BEGIN";
pub const IDLE: &str = "IDLE";
pub const WAIT: &str = "WAIT";

/// Index of a node in its [`PlanGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One executed action (or BEGIN / IDLE / WAIT marker).
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub id: NodeId,
    pub name: String,
    pub params: Vec<String>,
    pub agent: String,
    pub why: Option<Arc<Task>>,
    pub decompo_number: Option<usize>,
    pub previous: Option<NodeId>,
    pub next: Vec<NodeId>,
}

impl PlanNode {
    pub fn is_begin(&self) -> bool {
        self.name == BEGIN
    }

    /// True for BEGIN, IDLE and WAIT, which have no operator behind them.
    pub fn is_marker(&self) -> bool {
        matches!(self.name.as_str(), BEGIN | IDLE | WAIT)
    }

    pub fn is_leaf(&self) -> bool {
        self.next.is_empty()
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}.{}({})",
            self.id,
            self.agent,
            self.name,
            self.params.join(", ")
        )
    }
}

#[derive(Debug, Clone)]
pub struct PlanGraph {
    nodes: Vec<PlanNode>,
    solutions: Vec<NodeId>,
    next_task_id: u64,
}

impl PlanGraph {
    /// Create a graph holding only BEGIN, owned by `begin_owner`.
    ///
    /// Task ids minted during the search start at `first_task_id`.
    pub fn new(begin_owner: &str, first_task_id: u64) -> Self {
        let begin = PlanNode {
            id: NodeId(0),
            name: BEGIN.to_string(),
            params: Vec::new(),
            agent: begin_owner.to_string(),
            why: None,
            decompo_number: None,
            previous: None,
            next: Vec::new(),
        };
        Self {
            nodes: vec![begin],
            solutions: Vec::new(),
            next_task_id: first_task_id,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> Option<&PlanNode> {
        self.nodes.get(id.0)
    }

    /// Number of nodes ever created, including detached ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Terminal nodes of every discovered solution, in discovery order.
    pub fn solutions(&self) -> &[NodeId] {
        &self.solutions
    }

    /// Append an action executed from `task` after `previous`.
    pub(crate) fn push_action(&mut self, task: &Task, previous: NodeId) -> NodeId {
        self.push(PlanNode {
            id: NodeId(self.nodes.len()),
            name: task.name.clone(),
            params: task.params.clone(),
            agent: task.agent.clone(),
            why: task.why.clone(),
            decompo_number: task.decompo_number,
            previous: Some(previous),
            next: Vec::new(),
        })
    }

    /// Append an IDLE or WAIT marker for `agent` after `previous`.
    pub(crate) fn push_marker(&mut self, name: &str, agent: &str, previous: NodeId) -> NodeId {
        self.push(PlanNode {
            id: NodeId(self.nodes.len()),
            name: name.to_string(),
            params: Vec::new(),
            agent: agent.to_string(),
            why: None,
            decompo_number: Some(0),
            previous: Some(previous),
            next: Vec::new(),
        })
    }

    fn push(&mut self, node: PlanNode) -> NodeId {
        let id = node.id;
        if let Some(previous) = node.previous {
            self.nodes[previous.0].next.push(id);
        }
        self.nodes.push(node);
        id
    }

    /// Unlink `id` from its predecessor; its subtree becomes unreachable.
    pub(crate) fn detach(&mut self, id: NodeId) {
        if let Some(previous) = self.nodes[id.0].previous {
            self.nodes[previous.0].next.retain(|child| *child != id);
        }
    }

    pub(crate) fn record_solution(&mut self, leaf: NodeId) {
        self.solutions.push(leaf);
    }

    pub(crate) fn set_next(&mut self, id: NodeId, next: Vec<NodeId>) {
        self.nodes[id.0].next = next;
    }

    pub(crate) fn mint_task_id(&mut self) -> TaskId {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        id
    }

    /// Nodes from the root to `leaf`, both included.
    pub fn branch_to(&self, leaf: NodeId) -> Vec<NodeId> {
        let mut branch = Vec::new();
        let mut current = Some(leaf);
        while let Some(id) = current {
            branch.push(id);
            current = self.nodes[id.0].previous;
        }
        branch.reverse();
        branch
    }

    /// First action after BEGIN on the branch ending at `leaf`.
    ///
    /// Returns the root itself for the empty plan.
    pub fn first_action(&self, leaf: NodeId) -> NodeId {
        let branch = self.branch_to(leaf);
        branch.get(1).copied().unwrap_or(self.root())
    }

    /// Leaves of the subtree rooted at `from`, left to right.
    pub fn leaves(&self, from: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if node.is_leaf() {
                leaves.push(id);
            } else {
                stack.extend(node.next.iter().rev().copied());
            }
        }
        leaves
    }

    /// Nodes reachable from the root in depth-first pre-order.
    ///
    /// A node reachable along two paths is listed once.
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            stack.extend(self.nodes[id.0].next.iter().rev().copied());
        }
        order
    }
}

impl Index<NodeId> for PlanGraph {
    type Output = PlanNode;

    fn index(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{OperatorId, TaskKind};

    fn task(name: &str) -> Task {
        Task {
            id: TaskId(0),
            name: name.to_string(),
            params: Vec::new(),
            agent: "robot".to_string(),
            kind: TaskKind::Primitive(OperatorId(0)),
            why: None,
            decompo_number: None,
            number_of_decompo: 0,
            how: Vec::new(),
        }
    }

    #[test]
    fn push_links_both_directions() {
        let mut graph = PlanGraph::new("human", 0);
        let a = graph.push_action(&task("a"), graph.root());
        let idle = graph.push_marker(IDLE, "human", a);

        assert_eq!(graph[graph.root()].next, vec![a]);
        assert_eq!(graph[a].previous, Some(graph.root()));
        assert_eq!(graph[a].next, vec![idle]);
        assert_eq!(graph.branch_to(idle), vec![graph.root(), a, idle]);
        assert_eq!(graph.first_action(idle), a);
    }

    #[test]
    fn detach_prunes_subtree_from_reachable_set() {
        let mut graph = PlanGraph::new("human", 0);
        let a = graph.push_action(&task("a"), graph.root());
        let b = graph.push_action(&task("b"), graph.root());
        let c = graph.push_action(&task("c"), b);
        graph.detach(b);

        assert_eq!(graph.reachable(), vec![graph.root(), a]);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.leaves(graph.root()), vec![a]);
        assert_eq!(graph.leaves(b), vec![c]);
    }

    #[test]
    fn leaves_are_listed_left_to_right() {
        let mut graph = PlanGraph::new("human", 0);
        let a = graph.push_action(&task("a"), graph.root());
        let a1 = graph.push_marker(IDLE, "human", a);
        let a2 = graph.push_marker(WAIT, "human", a);
        let b = graph.push_action(&task("b"), graph.root());
        assert_eq!(graph.leaves(graph.root()), vec![a1, a2, b]);
    }

    #[test]
    fn minted_task_ids_continue_from_seed() {
        let mut graph = PlanGraph::new("human", 5);
        assert_eq!(graph.mint_task_id(), TaskId(5));
        assert_eq!(graph.mint_task_id(), TaskId(6));
    }
}
