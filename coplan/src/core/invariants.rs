//! Structural invariants of a plan graph.

use std::collections::HashSet;

use crate::core::graph::{NodeId, PlanGraph};

/// Check structural invariants of the part of `graph` reachable from BEGIN:
/// - The root is BEGIN and has no predecessor
/// - Every successor points back at its predecessor
/// - No successor is listed twice, and no node is reached twice (no cycles)
/// - Every recorded solution walks back to BEGIN
pub fn validate_graph(graph: &PlanGraph) -> Vec<String> {
    let mut errors = Vec::new();
    let root = graph.root();
    let Some(begin) = graph.get(root) else {
        errors.push("graph has no root".to_string());
        return errors;
    };
    if !begin.is_begin() {
        errors.push(format!("root {} is '{}', expected BEGIN", root, begin.name));
    }
    if begin.previous.is_some() {
        errors.push("root must not have a predecessor".to_string());
    }

    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            errors.push(format!("node {} reached twice (cycle or shared child)", id));
            continue;
        }
        let node = &graph[id];
        let mut children = HashSet::new();
        for child in &node.next {
            if !children.insert(*child) {
                errors.push(format!("node {} lists successor {} twice", id, child));
                continue;
            }
            match graph.get(*child) {
                None => errors.push(format!("node {} links to missing node {}", id, child)),
                Some(next) if next.previous != Some(id) => errors.push(format!(
                    "node {} is a successor of {} but its predecessor is {}",
                    child,
                    id,
                    label(next.previous)
                )),
                Some(_) => stack.push(*child),
            }
        }
    }

    for leaf in graph.solutions() {
        if !seen.contains(leaf) {
            errors.push(format!("solution {} is not reachable from BEGIN", leaf));
            continue;
        }
        if !walks_back_to_root(graph, *leaf) {
            errors.push(format!("solution {} does not walk back to BEGIN", leaf));
        }
    }

    errors
}

fn walks_back_to_root(graph: &PlanGraph, leaf: NodeId) -> bool {
    let mut visited = HashSet::new();
    let mut current = Some(leaf);
    while let Some(id) = current {
        if !visited.insert(id) {
            return false;
        }
        if id == graph.root() {
            return true;
        }
        current = graph.get(id).and_then(|node| node.previous);
    }
    false
}

fn label(id: Option<NodeId>) -> String {
    id.map_or_else(|| "<none>".to_string(), |id| id.to_string())
}
