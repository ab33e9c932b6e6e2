//! Exhaustive depth-first search over the controlled agent's task network.
//!
//! Each controlled action is followed by every projected response of the
//! uncontrolled agent. Branches that reach an empty controlled queue are
//! recorded as solutions; subtrees that produce none are detached from the
//! graph on the way back up, so only solution paths remain reachable.

use tracing::{debug, info};

use crate::core::agents::Agents;
use crate::core::domain::Domain;
use crate::core::engine::{Advance, advance};
use crate::core::graph::{NodeId, PlanGraph};
use crate::core::projection::{Prediction, project};
use crate::error::PlanningResult;

/// The two agents a search alternates between.
#[derive(Debug, Clone, Copy)]
pub struct Roles<'a> {
    pub controlled: &'a str,
    pub uncontrolled: &'a str,
}

/// Search every way `roles.controlled` can complete its queue.
///
/// Returns the solution graph rooted at BEGIN; `graph.solutions()` lists the
/// terminal node of every discovered branch.
pub fn seek_plans(
    domain: &Domain,
    agents: &Agents,
    roles: Roles<'_>,
    prediction: Prediction,
) -> PlanningResult<PlanGraph> {
    agents.require(roles.controlled)?;
    agents.require(roles.uncontrolled)?;

    let mut search = Search {
        domain,
        roles,
        prediction,
        graph: PlanGraph::new(roles.uncontrolled, agents.next_task_id()),
    };
    let root = search.graph.root();
    let found = search.explore(agents, root)?;
    info!(
        solutions = found,
        nodes = search.graph.len(),
        "plan search complete"
    );
    Ok(search.graph)
}

struct Search<'a> {
    domain: &'a Domain,
    roles: Roles<'a>,
    prediction: Prediction,
    graph: PlanGraph,
}

impl Search<'_> {
    /// Explore from `agents`, whose latest action is `last`; returns the number
    /// of solutions found below it.
    fn explore(&mut self, agents: &Agents, last: NodeId) -> PlanningResult<usize> {
        let controlled = self.roles.controlled;
        match advance(self.domain, &mut self.graph, agents, controlled, last)? {
            Advance::Exhausted => {
                self.graph.record_solution(last);
                debug!(leaf = %self.graph[last], "solution found");
                Ok(1)
            }
            Advance::Blocked => Ok(0),
            Advance::Applied(applied) => {
                let responses = project(
                    self.domain,
                    &mut self.graph,
                    &applied.agents,
                    self.roles.uncontrolled,
                    applied.action,
                    self.prediction,
                )?;
                let mut found = 0;
                for response in responses {
                    let below = self.explore(&response.agents, response.action)?;
                    if below == 0 {
                        self.graph.detach(response.action);
                    }
                    found += below;
                }
                if found == 0 {
                    self.graph.detach(applied.action);
                }
                Ok(found)
            }
            Advance::Expanded(alternatives) => {
                if alternatives.is_empty() {
                    return Ok(0);
                }
                let mut found = 0;
                for alternative in &alternatives {
                    found += self.explore(alternative, last)?;
                }
                Ok(found)
            }
        }
    }
}
