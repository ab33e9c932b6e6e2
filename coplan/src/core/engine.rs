//! Decomposition and application of the head of one agent's queue.
//!
//! Every successor is computed on its own clone of the snapshot it was given;
//! the input snapshot is never modified.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::agents::Agents;
use crate::core::domain::{Domain, OpResult};
use crate::core::graph::{NodeId, PlanGraph};
use crate::core::task::{MethodSetId, OperatorId, Task, TaskKind, TaskSpec};
use crate::error::{PlanningError, PlanningResult};

/// Result of advancing one agent by one step.
#[derive(Debug)]
pub enum Advance {
    /// The queue is empty.
    Exhausted,
    /// The head operator's precondition failed.
    Blocked,
    /// The head operator was applied.
    Applied(Applied),
    /// The head abstract task was replaced by each applicable alternative.
    /// Empty when no method applies.
    Expanded(Vec<Agents>),
}

#[derive(Debug)]
pub struct Applied {
    pub agents: Agents,
    pub action: NodeId,
    pub cost: Option<f64>,
}

/// Advance `actor` by handling the head of its queue.
///
/// An applied operator is appended to `graph` after `predecessor`.
pub fn advance(
    domain: &Domain,
    graph: &mut PlanGraph,
    agents: &Agents,
    actor: &str,
    predecessor: NodeId,
) -> PlanningResult<Advance> {
    let Some(task) = agents.require(actor)?.tasks.front() else {
        return Ok(Advance::Exhausted);
    };
    match task.kind {
        TaskKind::Primitive(op) => apply_operator(domain, graph, agents, task, op, predecessor),
        TaskKind::Abstract(set) => expand(domain, graph, agents, task, set).map(Advance::Expanded),
    }
}

fn apply_operator(
    domain: &Domain,
    graph: &mut PlanGraph,
    agents: &Agents,
    task: &Task,
    op: OperatorId,
    predecessor: NodeId,
) -> PlanningResult<Advance> {
    let actor = task.agent.as_str();
    let operator = domain.agent(actor)?.operator(op);
    let mut next = agents.clone();
    let cost = match (operator.apply)(&mut next, actor, &task.params) {
        OpResult::Inapplicable => {
            debug!(agent = actor, task = %task, "operator not applicable");
            return Ok(Advance::Blocked);
        }
        OpResult::Applied { cost } => cost,
    };

    let action = graph.push_action(task, predecessor);
    let own = next.require_mut(actor)?;
    own.tasks.pop_front();
    own.plan.push(action);
    trace!(agent = actor, node = %graph[action], "operator applied");

    fire_triggers(domain, graph, &mut next, actor)?;
    Ok(Advance::Applied(Applied {
        agents: next,
        action,
        cost,
    }))
}

/// Let every other agent react to `actor`'s action; at most one trigger fires
/// per agent, the first one in declaration order.
fn fire_triggers(
    domain: &Domain,
    graph: &mut PlanGraph,
    agents: &mut Agents,
    actor: &str,
) -> PlanningResult<()> {
    let others: Vec<String> = agents
        .names()
        .filter(|name| *name != actor)
        .map(str::to_string)
        .collect();
    for name in others {
        // An agent with only a state has no triggers.
        let Ok(def) = domain.agent(&name) else {
            continue;
        };
        for (index, trigger) in def.triggers().iter().enumerate() {
            let Some(specs) = trigger(agents, &name) else {
                continue;
            };
            let origin = format!("trigger #{index}");
            let mut spawned = Vec::with_capacity(specs.len());
            for spec in &specs {
                let id = graph.mint_task_id();
                spawned.push(domain.instantiate(&name, spec, &origin, id, None, None)?);
            }
            debug!(agent = %name, trigger = index, spawned = spawned.len(), "trigger fired");
            let queue = &mut agents.require_mut(&name)?.tasks;
            for task in spawned.into_iter().rev() {
                queue.push_front(task);
            }
            break;
        }
    }
    Ok(())
}

/// Try every method of `task` in declaration order against `agents`; each
/// applicable alternative yields one successor.
pub fn expand(
    domain: &Domain,
    graph: &mut PlanGraph,
    agents: &Agents,
    task: &Task,
    set: MethodSetId,
) -> PlanningResult<Vec<Agents>> {
    let actor = task.agent.as_str();
    let methods = &domain.agent(actor)?.method_set(set).methods;

    let mut produced: Vec<(usize, Vec<TaskSpec>)> = Vec::new();
    for (index, method) in methods.iter().enumerate() {
        let decomposition =
            method(agents, actor, &task.params).ok_or_else(|| PlanningError::MethodReturnedNone {
                agent: actor.to_string(),
                task: task.name.clone(),
                method: index,
            })?;
        for alternative in decomposition.into_alternatives() {
            produced.push((index, alternative));
        }
    }
    if produced.is_empty() {
        debug!(agent = actor, task = %task, "no applicable decomposition");
        return Ok(Vec::new());
    }

    let parent = Arc::new(Task {
        how: produced.iter().map(|(_, specs)| specs.clone()).collect(),
        ..task.clone()
    });
    let mut successors = Vec::with_capacity(produced.len());
    for (index, specs) in produced {
        let origin = format!("method #{index} of task '{}'", task.name);
        let mut subtasks = Vec::with_capacity(specs.len());
        for spec in &specs {
            let id = graph.mint_task_id();
            subtasks.push(domain.instantiate(
                actor,
                spec,
                &origin,
                id,
                Some(Arc::clone(&parent)),
                Some(index),
            )?);
        }
        let mut next = agents.clone();
        let queue = &mut next.require_mut(actor)?.tasks;
        queue.pop_front();
        for subtask in subtasks.into_iter().rev() {
            queue.push_front(subtask);
        }
        successors.push(next);
    }
    trace!(agent = actor, task = %task, alternatives = successors.len(), "task expanded");
    Ok(successors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::Decomposition;
    use crate::core::state::{Fact, WorldState};
    use crate::test_support::{HUMAN, ROBOT, stacking_agents, stacking_domain};

    fn head_names(agents: &Agents, agent: &str) -> Vec<String> {
        agents
            .require(agent)
            .expect("agent")
            .tasks
            .iter()
            .map(|task| task.name.clone())
            .collect()
    }

    #[test]
    fn empty_queue_is_exhausted() {
        let domain = stacking_domain();
        let agents = stacking_agents(&domain, Vec::new(), Vec::new());
        let mut graph = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = graph.root();
        let outcome = advance(&domain, &mut graph, &agents, ROBOT, root).expect("advance");
        assert!(matches!(outcome, Advance::Exhausted));
    }

    #[test]
    fn applied_operator_pops_task_and_links_node() {
        let domain = stacking_domain();
        let agents = stacking_agents(&domain, vec![TaskSpec::new("pick", ["a"])], Vec::new());
        let mut graph = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = graph.root();

        let Advance::Applied(applied) =
            advance(&domain, &mut graph, &agents, ROBOT, root).expect("advance")
        else {
            panic!("expected operator application");
        };
        let robot = applied.agents.require(ROBOT).expect("robot");
        assert!(robot.tasks.is_empty());
        assert_eq!(robot.plan, vec![applied.action]);
        assert_eq!(applied.cost, Some(1.0));
        assert_eq!(graph[applied.action].previous, Some(root));
        assert!(robot.state.contains("holding", ROBOT, "a"));
    }

    #[test]
    fn failed_precondition_leaves_input_untouched() {
        let domain = stacking_domain();
        let agents = stacking_agents(&domain, vec![TaskSpec::new("pick", ["z"])], Vec::new());
        let before = agents.clone();
        let mut graph = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = graph.root();

        let outcome = advance(&domain, &mut graph, &agents, ROBOT, root).expect("advance");
        assert!(matches!(outcome, Advance::Blocked));
        assert_eq!(agents, before);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn expansion_yields_one_successor_per_alternative() {
        let domain = stacking_domain();
        let agents = stacking_agents(&domain, Vec::new(), vec![TaskSpec::new("maybe_pick", ["a"])]);
        let mut graph = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = graph.root();

        let Advance::Expanded(successors) =
            advance(&domain, &mut graph, &agents, HUMAN, root).expect("advance")
        else {
            panic!("expected expansion");
        };
        assert_eq!(successors.len(), 2);
        assert_eq!(head_names(&successors[0], HUMAN), vec!["pick".to_string()]);
        assert!(head_names(&successors[1], HUMAN).is_empty());

        let pick = &successors[0].require(HUMAN).expect("human").tasks[0];
        let why = pick.why.as_ref().expect("why");
        assert_eq!(why.name, "maybe_pick");
        assert_eq!(why.how.len(), 2);
        assert_eq!(pick.decompo_number, Some(0));
    }

    #[test]
    fn expansion_is_deterministic() {
        let domain = stacking_domain();
        let agents = stacking_agents(&domain, Vec::new(), vec![TaskSpec::new("maybe_pick", ["a"])]);
        let mut first = PlanGraph::new(HUMAN, agents.next_task_id());
        let mut second = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = first.root();
        let Advance::Expanded(left) = advance(&domain, &mut first, &agents, HUMAN, root).expect("a")
        else {
            panic!("expected expansion");
        };
        let Advance::Expanded(right) =
            advance(&domain, &mut second, &agents, HUMAN, root).expect("b")
        else {
            panic!("expected expansion");
        };
        assert_eq!(left, right);
    }

    #[test]
    fn method_returning_none_is_fatal() {
        let mut domain = Domain::new();
        domain
            .declare_method(ROBOT, "broken", |_, _, _| None)
            .expect("method");
        let mut agents = Agents::new();
        agents.set_state(ROBOT, WorldState::new());
        agents
            .add_tasks(&domain, ROBOT, [TaskSpec::bare("broken")])
            .expect("tasks");
        let mut graph = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = graph.root();

        let err = advance(&domain, &mut graph, &agents, ROBOT, root).expect_err("fatal");
        assert!(matches!(err, PlanningError::MethodReturnedNone { method: 0, .. }));
    }

    #[test]
    fn unknown_subtask_is_fatal() {
        let mut domain = Domain::new();
        domain
            .declare_method(ROBOT, "plan", |_, _, _| {
                Some(Decomposition::Subtasks(vec![TaskSpec::bare("teleport")]))
            })
            .expect("method");
        let mut agents = Agents::new();
        agents.set_state(ROBOT, WorldState::new());
        agents
            .add_tasks(&domain, ROBOT, [TaskSpec::bare("plan")])
            .expect("tasks");
        let mut graph = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = graph.root();

        let err = advance(&domain, &mut graph, &agents, ROBOT, root).expect_err("fatal");
        assert!(matches!(err, PlanningError::UnknownTask { ref task, .. } if task == "teleport"));
    }

    #[test]
    fn first_matching_trigger_prepends_tasks_to_other_agent() {
        let mut domain = stacking_domain();
        domain.declare_trigger(HUMAN, |agents: &Agents, _me: &str| {
            let robot = agents.state(ROBOT)?;
            robot
                .contains("holding", ROBOT, "a")
                .then(|| vec![TaskSpec::new("pick", ["b"])])
        });
        domain.declare_trigger(HUMAN, |_: &Agents, _: &str| Some(vec![TaskSpec::bare("never")]));
        let agents = stacking_agents(&domain, vec![TaskSpec::new("pick", ["a"])], Vec::new());
        let mut graph = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = graph.root();

        let Advance::Applied(applied) =
            advance(&domain, &mut graph, &agents, ROBOT, root).expect("advance")
        else {
            panic!("expected operator application");
        };
        assert_eq!(head_names(&applied.agents, HUMAN), vec!["pick".to_string()]);
        assert!(
            applied
                .agents
                .state(HUMAN)
                .expect("human")
                .get("holding", ROBOT)
                .is_some_and(|fact| *fact == Fact::list(["a"]))
        );
    }

    #[test]
    fn trigger_returning_undeclared_task_is_fatal() {
        let mut domain = stacking_domain();
        domain.declare_trigger(HUMAN, |_: &Agents, _: &str| Some(vec![TaskSpec::bare("dance")]));
        let agents = stacking_agents(&domain, vec![TaskSpec::new("pick", ["a"])], Vec::new());
        let mut graph = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = graph.root();

        let err = advance(&domain, &mut graph, &agents, ROBOT, root).expect_err("fatal");
        assert_eq!(
            err,
            PlanningError::UnknownTask {
                agent: HUMAN.to_string(),
                task: "dance".to_string(),
                origin: "trigger #0".to_string(),
            }
        );
    }

    #[test]
    fn acting_agent_triggers_are_not_evaluated() {
        let mut domain = stacking_domain();
        domain.declare_trigger(ROBOT, |_: &Agents, _: &str| Some(vec![TaskSpec::bare("dance")]));
        let agents = stacking_agents(&domain, vec![TaskSpec::new("pick", ["a"])], Vec::new());
        let mut graph = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = graph.root();

        let Advance::Applied(applied) =
            advance(&domain, &mut graph, &agents, ROBOT, root).expect("advance")
        else {
            panic!("expected operator application");
        };
        assert!(head_names(&applied.agents, ROBOT).is_empty());
        assert!(head_names(&applied.agents, HUMAN).is_empty());
    }

    #[test]
    fn agent_with_only_a_state_has_no_triggers() {
        let domain = stacking_domain();
        let mut agents = stacking_agents(&domain, vec![TaskSpec::new("pick", ["a"])], Vec::new());
        agents.set_state("observer", WorldState::new());
        let mut graph = PlanGraph::new(HUMAN, agents.next_task_id());
        let root = graph.root();

        let outcome = advance(&domain, &mut graph, &agents, ROBOT, root).expect("advance");
        assert!(matches!(outcome, Advance::Applied(_)));
    }
}
