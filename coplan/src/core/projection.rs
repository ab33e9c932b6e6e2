//! Projection of the uncontrolled agent's possible next actions.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::agents::Agents;
use crate::core::domain::Domain;
use crate::core::engine::{Advance, advance};
use crate::core::graph::{IDLE, NodeId, PlanGraph, WAIT};
use crate::error::PlanningResult;

/// How many of the uncontrolled agent's responses are considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prediction {
    /// Every applicable response, in declaration order.
    #[default]
    AllApplicable,
    /// Only the first applicable response.
    FirstApplicable,
}

/// One predicted response: the snapshot after it and its plan node.
#[derive(Debug)]
pub struct Projected {
    pub agents: Agents,
    pub action: NodeId,
}

/// Unroll `actor`'s queue until every live branch has executed exactly one
/// action.
///
/// An empty queue yields a single IDLE. A non-empty queue from which nothing
/// can be executed yields a single WAIT, so the result is never empty.
pub fn project(
    domain: &Domain,
    graph: &mut PlanGraph,
    agents: &Agents,
    actor: &str,
    predecessor: NodeId,
    prediction: Prediction,
) -> PlanningResult<Vec<Projected>> {
    if agents.require(actor)?.tasks.is_empty() {
        return Ok(vec![marker(graph, agents, actor, IDLE, predecessor)?]);
    }

    let mut branches = Vec::new();
    unroll(
        domain,
        graph,
        agents,
        actor,
        predecessor,
        prediction,
        &mut branches,
    )?;
    if branches.is_empty() {
        debug!(agent = actor, "no applicable action, substituting WAIT");
        return Ok(vec![marker(graph, agents, actor, WAIT, predecessor)?]);
    }
    debug!(agent = actor, branches = branches.len(), "projected responses");
    Ok(branches)
}

fn unroll(
    domain: &Domain,
    graph: &mut PlanGraph,
    agents: &Agents,
    actor: &str,
    predecessor: NodeId,
    prediction: Prediction,
    out: &mut Vec<Projected>,
) -> PlanningResult<()> {
    if prediction == Prediction::FirstApplicable && !out.is_empty() {
        return Ok(());
    }
    match advance(domain, graph, agents, actor, predecessor)? {
        Advance::Exhausted => out.push(marker(graph, agents, actor, IDLE, predecessor)?),
        Advance::Blocked => {}
        Advance::Applied(applied) => out.push(Projected {
            agents: applied.agents,
            action: applied.action,
        }),
        Advance::Expanded(alternatives) => {
            for alternative in &alternatives {
                unroll(
                    domain,
                    graph,
                    alternative,
                    actor,
                    predecessor,
                    prediction,
                    out,
                )?;
            }
        }
    }
    Ok(())
}

fn marker(
    graph: &mut PlanGraph,
    agents: &Agents,
    actor: &str,
    name: &str,
    predecessor: NodeId,
) -> PlanningResult<Projected> {
    let mut next = agents.clone();
    let action = graph.push_marker(name, actor, predecessor);
    next.require_mut(actor)?.plan.push(action);
    Ok(Projected {
        agents: next,
        action,
    })
}
