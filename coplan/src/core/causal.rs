//! Causal-link post-treatment of one plan branch.
//!
//! Each executed action becomes a [`Step`] carrying the joint state after it
//! and the effects it had on a set of tracked attributes, as seen by one
//! observer agent. Supports explain which earlier steps make a step
//! applicable; threats record which steps would disable one another if they
//! were reordered.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::agents::Agents;
use crate::core::domain::{Domain, Operator};
use crate::core::graph::{NodeId, PlanGraph, PlanNode};
use crate::core::state::{Fact, WorldState};
use crate::error::{PlanningError, PlanningResult};

/// One member added to or removed from `attribute[key]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Modification {
    pub attribute: String,
    pub key: String,
    pub value: String,
}

impl Modification {
    fn new(attribute: &str, key: &str, value: String) -> Self {
        Self {
            attribute: attribute.to_string(),
            key: key.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Effects {
    pub append: Vec<Modification>,
    pub remove: Vec<Modification>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.append.is_empty() && self.remove.is_empty()
    }

    /// Difference between two states over `attributes`.
    pub fn between(before: &WorldState, after: &WorldState, attributes: &[String]) -> Self {
        let mut effects = Effects::default();
        for attribute in attributes {
            let keys: BTreeSet<&str> = before.keys(attribute).chain(after.keys(attribute)).collect();
            for key in keys {
                let old = before.members(attribute, key);
                let new = after.members(attribute, key);
                for value in &old {
                    if !new.contains(value) {
                        effects
                            .remove
                            .push(Modification::new(attribute, key, value.clone()));
                    }
                }
                for value in &new {
                    if !old.contains(value) {
                        effects
                            .append
                            .push(Modification::new(attribute, key, value.clone()));
                    }
                }
            }
        }
        effects
    }

    /// Replay these effects on every agent's beliefs: appends first, then
    /// removals.
    pub fn apply(&self, agents: &mut Agents) {
        agents.update_all(|state| {
            for add in &self.append {
                match state.get(&add.attribute, &add.key) {
                    Some(Fact::List(_)) => state.push(&add.attribute, &add.key, add.value.clone()),
                    Some(Fact::Number(_)) => {
                        let fact = add
                            .value
                            .parse()
                            .map_or_else(|_| Fact::symbol(add.value.clone()), Fact::Number);
                        state.set(&add.attribute, &add.key, fact);
                    }
                    _ => state.set(&add.attribute, &add.key, Fact::symbol(add.value.clone())),
                }
            }
            for rm in &self.remove {
                if !state.remove_member(&rm.attribute, &rm.key, &rm.value) {
                    trace!(
                        attribute = %rm.attribute,
                        key = %rm.key,
                        value = %rm.value,
                        "nothing to remove"
                    );
                }
            }
        });
    }
}

/// An executed action of the analyzed branch.
#[derive(Debug, Clone)]
pub struct Step {
    pub action: NodeId,
    /// Joint state after the action.
    pub agents: Agents,
    pub effects: Effects,
}

/// `source` supports or threatens `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: NodeId,
    pub target: NodeId,
}

/// Ordered set of links without self-links or duplicates.
#[derive(Debug, Clone, Default)]
struct LinkSet(Vec<Link>);

impl LinkSet {
    fn insert(&mut self, source: NodeId, target: NodeId) -> bool {
        if source == target {
            return false;
        }
        let link = Link { source, target };
        if self.0.contains(&link) {
            return false;
        }
        self.0.push(link);
        true
    }

    fn sources_of(&self, target: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.0
            .iter()
            .filter(move |link| link.target == target)
            .map(|link| link.source)
    }
}

#[derive(Debug, Clone)]
pub struct CausalLinks {
    /// BEGIN first, then every executed action; IDLE and WAIT are skipped.
    pub steps: Vec<Step>,
    pub supports: Vec<Link>,
    pub threats: Vec<Link>,
}

impl CausalLinks {
    pub fn supports_of(&self, target: NodeId) -> Vec<NodeId> {
        self.supports
            .iter()
            .filter(|link| link.target == target)
            .map(|link| link.source)
            .collect()
    }

    pub fn step(&self, action: NodeId) -> Option<&Step> {
        self.steps.iter().find(|step| step.action == action)
    }
}

/// Compute supports and threats along `branch`, a root-to-leaf node list of
/// `graph`, starting from `initial`.
///
/// Effects are read from `observer`'s beliefs and restricted to `attributes`.
pub fn analyze(
    domain: &Domain,
    initial: &Agents,
    graph: &PlanGraph,
    branch: &[NodeId],
    attributes: &[String],
    observer: &str,
) -> PlanningResult<CausalLinks> {
    initial.require(observer)?;
    let mut analyzer = Analyzer {
        domain,
        graph,
        steps: vec![Step {
            action: graph.root(),
            agents: initial.clone(),
            effects: Effects::default(),
        }],
        supports: LinkSet::default(),
        threats: LinkSet::default(),
    };
    analyzer.record_steps(branch, attributes, observer)?;
    analyzer.find_supports()?;
    analyzer.find_threats()?;
    debug!(
        steps = analyzer.steps.len(),
        supports = analyzer.supports.0.len(),
        threats = analyzer.threats.0.len(),
        "causal links computed"
    );
    Ok(CausalLinks {
        steps: analyzer.steps,
        supports: analyzer.supports.0,
        threats: analyzer.threats.0,
    })
}

struct Analyzer<'a> {
    domain: &'a Domain,
    graph: &'a PlanGraph,
    steps: Vec<Step>,
    supports: LinkSet,
    threats: LinkSet,
}

impl Analyzer<'_> {
    fn record_steps(
        &mut self,
        branch: &[NodeId],
        attributes: &[String],
        observer: &str,
    ) -> PlanningResult<()> {
        for id in branch {
            let node = &self.graph[*id];
            if node.is_marker() {
                continue;
            }
            let Some(previous) = self.steps.last() else {
                continue;
            };
            let agents = self
                .replay(&previous.agents, node)?
                .ok_or_else(|| PlanningError::ReplayFailed {
                    agent: node.agent.clone(),
                    operator: node.name.clone(),
                    node: node.id,
                })?;
            let effects = Effects::between(
                &previous.agents.require(observer)?.state,
                &agents.require(observer)?.state,
                attributes,
            );
            trace!(
                node = %node,
                appended = effects.append.len(),
                removed = effects.remove.len(),
                "step recorded"
            );
            self.steps.push(Step {
                action: *id,
                agents,
                effects,
            });
        }
        Ok(())
    }

    /// Walk backwards from the last step, attributing each step's
    /// applicability to the earlier steps whose effects enable it.
    fn find_supports(&mut self) -> PlanningResult<()> {
        let begin = self.steps[0].action;
        for i in (1..self.steps.len()).rev() {
            let target = self.steps[i].action;
            if self.supported_from_start(i)? {
                self.supports.insert(begin, target);
                continue;
            }
            let mut complete = false;
            for j in (1..i).rev() {
                let mut before = self.steps[j - 1].agents.clone();
                self.apply_known_supports(&mut before, target);
                let mut after = before.clone();
                self.steps[j].effects.apply(&mut after);
                if !self.applicable(&before, i)? && self.applicable(&after, i)? {
                    self.supports.insert(self.steps[j].action, target);
                    if self.supported_from_start(i)? {
                        complete = true;
                        break;
                    }
                }
            }
            if !complete {
                debug!(node = %self.graph[target], "step only partially supported");
            }
        }
        Ok(())
    }

    /// Whether step `i` applies to the initial state once the effects of its
    /// known supports are added.
    fn supported_from_start(&self, i: usize) -> PlanningResult<bool> {
        let mut agents = self.steps[0].agents.clone();
        self.apply_known_supports(&mut agents, self.steps[i].action);
        self.applicable(&agents, i)
    }

    fn apply_known_supports(&self, agents: &mut Agents, target: NodeId) {
        for source in self.supports.sources_of(target) {
            if let Some(step) = self.steps.iter().find(|step| step.action == source) {
                step.effects.apply(agents);
            }
        }
    }

    /// After each step, every later step applicable at that point that stops
    /// being applicable once another of them runs is threatened by it.
    fn find_threats(&mut self) -> PlanningResult<()> {
        for k in 0..self.steps.len() {
            let current = &self.steps[k].agents;
            let mut applicable = Vec::new();
            for later in k + 1..self.steps.len() {
                if self.applicable(current, later)? {
                    applicable.push(later);
                }
            }
            for &first in &applicable {
                let node = &self.graph[self.steps[first].action];
                let Some(after) = self.replay(current, node)? else {
                    continue;
                };
                for &other in &applicable {
                    if other != first && !self.applicable(&after, other)? {
                        self.threats
                            .insert(self.steps[first].action, self.steps[other].action);
                    }
                }
            }
        }
        Ok(())
    }

    fn applicable(&self, agents: &Agents, step: usize) -> PlanningResult<bool> {
        let node = &self.graph[self.steps[step].action];
        Ok(self.replay(agents, node)?.is_some())
    }

    fn replay(&self, agents: &Agents, node: &PlanNode) -> PlanningResult<Option<Agents>> {
        let operator = self.operator(node)?;
        let mut next = agents.clone();
        let applied = (operator.apply)(&mut next, &node.agent, &node.params).is_applied();
        Ok(applied.then_some(next))
    }

    fn operator(&self, node: &PlanNode) -> PlanningResult<&Operator> {
        self.domain
            .agent(&node.agent)?
            .operator_named(&node.name)
            .ok_or_else(|| PlanningError::UnknownTask {
                agent: node.agent.clone(),
                task: node.name.clone(),
                origin: format!("plan node {}", node.id),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::OpResult;
    use crate::core::projection::Prediction;
    use crate::core::search::{Roles, seek_plans};
    use crate::core::task::TaskSpec;
    use crate::test_support::{HUMAN, ROBOT, ROOM, stacking_agents, stacking_domain};

    const ROLES: Roles<'static> = Roles {
        controlled: ROBOT,
        uncontrolled: HUMAN,
    };

    fn tracked(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn analyze_first_solution(
        domain: &Domain,
        agents: &Agents,
        attributes: &[String],
    ) -> (PlanGraph, CausalLinks) {
        let graph = seek_plans(domain, agents, ROLES, Prediction::AllApplicable).expect("search");
        let branch = graph.branch_to(graph.solutions()[0]);
        let links = analyze(domain, agents, &graph, &branch, attributes, ROBOT).expect("analyze");
        (graph, links)
    }

    fn step_named(graph: &PlanGraph, links: &CausalLinks, name: &str, param: &str) -> NodeId {
        links
            .steps
            .iter()
            .map(|step| step.action)
            .find(|id| graph[*id].name == name && graph[*id].params.first().map(String::as_str) == Some(param))
            .expect("step")
    }

    fn stacking() -> (PlanGraph, CausalLinks) {
        let domain = stacking_domain();
        let agents = stacking_agents(
            &domain,
            vec![
                TaskSpec::new("pick", ["a"]),
                TaskSpec::new("pick", ["b"]),
                TaskSpec::new("build", ["a", "b"]),
            ],
            Vec::new(),
        );
        analyze_first_solution(&domain, &agents, &tracked(&["on_floor", "holding", "tower"]))
    }

    #[test]
    fn steps_skip_idle_and_start_at_begin() {
        let (graph, links) = stacking();
        let names: Vec<&str> = links
            .steps
            .iter()
            .map(|step| graph[step.action].name.as_str())
            .collect();
        assert_eq!(names, vec!["BEGIN", "pick", "pick", "build"]);
        assert!(links.steps[0].effects.is_empty());
    }

    #[test]
    fn pick_effects_move_object_into_hands() {
        let (graph, links) = stacking();
        let pick_a = step_named(&graph, &links, "pick", "a");
        let effects = &links.step(pick_a).expect("step").effects;
        assert_eq!(
            effects.append,
            vec![Modification::new("holding", ROBOT, "a".to_string())]
        );
        assert_eq!(
            effects.remove,
            vec![Modification::new("on_floor", ROOM, "a".to_string())]
        );
    }

    #[test]
    fn build_is_supported_by_both_picks() {
        let (graph, links) = stacking();
        let pick_a = step_named(&graph, &links, "pick", "a");
        let pick_b = step_named(&graph, &links, "pick", "b");
        let build = step_named(&graph, &links, "build", "a");

        let mut sources = links.supports_of(build);
        sources.sort();
        assert_eq!(sources, vec![pick_a, pick_b]);
        assert_eq!(links.supports_of(pick_a), vec![graph.root()]);
        assert_eq!(links.supports_of(pick_b), vec![graph.root()]);
        assert!(links.threats.is_empty());
    }

    #[test]
    fn links_never_point_at_their_source() {
        let (_, links) = stacking();
        assert!(
            links
                .supports
                .iter()
                .chain(&links.threats)
                .all(|link| link.source != link.target)
        );
    }

    #[test]
    fn effects_replay_onto_every_agent() {
        let domain = stacking_domain();
        let mut agents = stacking_agents(&domain, Vec::new(), Vec::new());
        let effects = Effects {
            append: vec![Modification::new("holding", HUMAN, "a".to_string())],
            remove: vec![
                Modification::new("on_floor", ROOM, "a".to_string()),
                Modification::new("on_floor", ROOM, "z".to_string()),
            ],
        };
        effects.apply(&mut agents);
        for name in [ROBOT, HUMAN] {
            let state = agents.state(name).expect("state");
            assert!(state.contains("holding", HUMAN, "a"));
            assert_eq!(state.members("on_floor", ROOM), vec!["b".to_string()]);
        }
    }

    #[test]
    fn disabling_a_later_step_is_a_threat() {
        let mut domain = Domain::new();
        for (name, attribute, value) in [("knock", "knocked", "yes"), ("open", "door", "open")] {
            domain
                .declare_operator(ROBOT, name, move |agents: &mut Agents, me: &str, _: &[String]| {
                    let closed = agents
                        .state(me)
                        .and_then(|state| state.get("door", "front"))
                        .and_then(Fact::as_symbol)
                        == Some("closed");
                    if !closed {
                        return OpResult::Inapplicable;
                    }
                    agents.update_all(|state| state.set(attribute, "front", Fact::symbol(value)));
                    OpResult::cost(1.0)
                })
                .expect("operator");
        }
        domain
            .declare_operator(HUMAN, "wave", |_: &mut Agents, _: &str, _: &[String]| {
                OpResult::cost(1.0)
            })
            .expect("wave");

        let state = WorldState::new().with("door", "front", Fact::symbol("closed"));
        let mut agents = Agents::new();
        agents.set_state(ROBOT, state.clone());
        agents.set_state(HUMAN, state);
        agents
            .add_tasks(&domain, ROBOT, [TaskSpec::bare("knock"), TaskSpec::bare("open")])
            .expect("tasks");

        let (graph, links) = analyze_first_solution(&domain, &agents, &tracked(&["door", "knocked"]));
        let knock = links.steps[1].action;
        let open = links.steps[2].action;
        assert_eq!(graph[knock].name, "knock");
        assert_eq!(
            links.threats,
            vec![Link {
                source: open,
                target: knock
            }]
        );
        assert_eq!(links.supports_of(open), vec![graph.root()]);
    }

    #[test]
    fn unknown_observer_is_rejected() {
        let domain = stacking_domain();
        let agents = stacking_agents(&domain, Vec::new(), Vec::new());
        let graph = seek_plans(&domain, &agents, ROLES, Prediction::AllApplicable).expect("search");
        let err = analyze(&domain, &agents, &graph, &[graph.root()], &[], "ghost").expect_err("ghost");
        assert_eq!(err, PlanningError::UnknownAgent("ghost".to_string()));
    }
}
