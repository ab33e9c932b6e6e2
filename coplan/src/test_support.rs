//! Test-only domains and snapshots.

use crate::core::agents::Agents;
use crate::core::domain::{Decomposition, Domain, OpResult};
use crate::core::state::{Fact, WorldState};
use crate::core::task::TaskSpec;

pub const ROBOT: &str = "robot";
pub const HUMAN: &str = "human";
pub const ROOM: &str = "room";

/// Block stacking shared by both agents.
///
/// - `pick(o)`: `o` lies on the floor where the agent stands; moves it into
///   the agent's hands in every agent's beliefs. Cost 1.
/// - `build(x, y)`: the agent holds both; stacks them into the tower. Cost 2.
/// - `maybe_pick(o)` (human only): pick `o`, or do nothing.
pub fn stacking_domain() -> Domain {
    let mut domain = Domain::new();
    for agent in [ROBOT, HUMAN] {
        domain
            .declare_operator(agent, "pick", |agents: &mut Agents, me: &str, params: &[String]| {
                let [object] = params else {
                    return OpResult::Inapplicable;
                };
                let Some(place) = location(agents, me) else {
                    return OpResult::Inapplicable;
                };
                let on_floor = agents
                    .state(me)
                    .is_some_and(|state| state.contains("on_floor", &place, object));
                if !on_floor {
                    return OpResult::Inapplicable;
                }
                agents.update_all(|state| {
                    state.remove_member("on_floor", &place, object);
                    state.push("holding", me, object.clone());
                });
                OpResult::cost(1.0)
            })
            .expect("pick");
        domain
            .declare_operator(agent, "build", |agents: &mut Agents, me: &str, params: &[String]| {
                let [bottom, top] = params else {
                    return OpResult::Inapplicable;
                };
                let holds_both = agents.state(me).is_some_and(|state| {
                    state.contains("holding", me, bottom) && state.contains("holding", me, top)
                });
                if !holds_both {
                    return OpResult::Inapplicable;
                }
                agents.update_all(|state| {
                    state.remove_member("holding", me, bottom);
                    state.remove_member("holding", me, top);
                    state.set("tower", ROOM, Fact::list([bottom.as_str(), top.as_str()]));
                });
                OpResult::cost(2.0)
            })
            .expect("build");
    }
    domain
        .declare_method(HUMAN, "maybe_pick", |_: &Agents, _: &str, params: &[String]| {
            let [object] = params else {
                return Some(Decomposition::Inapplicable);
            };
            Some(Decomposition::Subtasks(vec![TaskSpec::new(
                "pick",
                [object.as_str()],
            )]))
        })
        .expect("maybe_pick");
    domain
        .declare_method(HUMAN, "maybe_pick", |_: &Agents, _: &str, _: &[String]| {
            Some(Decomposition::Subtasks(Vec::new()))
        })
        .expect("maybe_pick");
    domain
}

fn location(agents: &Agents, me: &str) -> Option<String> {
    agents
        .state(me)?
        .get("at", me)?
        .as_symbol()
        .map(str::to_string)
}

/// Both agents in [`ROOM`] with `a` and `b` on the floor and empty hands.
pub fn stacking_agents(
    domain: &Domain,
    robot_tasks: Vec<TaskSpec>,
    human_tasks: Vec<TaskSpec>,
) -> Agents {
    let state = WorldState::new()
        .with("at", ROBOT, Fact::symbol(ROOM))
        .with("at", HUMAN, Fact::symbol(ROOM))
        .with("on_floor", ROOM, Fact::list(["a", "b"]))
        .with("holding", ROBOT, Fact::list(Vec::<String>::new()))
        .with("holding", HUMAN, Fact::list(Vec::<String>::new()));
    let mut agents = Agents::new();
    agents.set_state(ROBOT, state.clone());
    agents.set_state(HUMAN, state);
    agents.add_tasks(domain, ROBOT, robot_tasks).expect("robot tasks");
    agents.add_tasks(domain, HUMAN, human_tasks).expect("human tasks");
    agents
}

/// Drink serving with costs chosen to exercise policy selection.
///
/// Robot: `pour_water` (1), `pour_juice` (3), `pour_tea` (no own cost) and
/// `serve`, which pours juice or water. Human: `react`, either `thank` (2) or
/// `complain` (4).
pub fn serving_domain() -> Domain {
    let mut domain = Domain::new();
    for (drink, cost) in [("water", Some(1.0)), ("juice", Some(3.0)), ("tea", None)] {
        let name = format!("pour_{drink}");
        domain
            .declare_operator(ROBOT, &name, move |agents: &mut Agents, _: &str, _: &[String]| {
                agents.update_all(|state| state.set("glass", ROOM, Fact::symbol(drink)));
                match cost {
                    Some(cost) => OpResult::cost(cost),
                    None => OpResult::from_table(),
                }
            })
            .expect("pour");
    }
    domain
        .declare_method(ROBOT, "serve", |_: &Agents, _: &str, _: &[String]| {
            Some(Decomposition::Alternatives(vec![
                vec![TaskSpec::bare("pour_juice")],
                vec![TaskSpec::bare("pour_water")],
            ]))
        })
        .expect("serve");

    for (reaction, cost) in [("thank", 2.0), ("complain", 4.0)] {
        domain
            .declare_operator(HUMAN, reaction, move |_: &mut Agents, _: &str, _: &[String]| {
                OpResult::cost(cost)
            })
            .expect("reaction");
    }
    domain
        .declare_method(HUMAN, "react", |_: &Agents, _: &str, _: &[String]| {
            Some(Decomposition::Alternatives(vec![
                vec![TaskSpec::bare("thank")],
                vec![TaskSpec::bare("complain")],
            ]))
        })
        .expect("react");
    domain
}

/// Empty glass in [`ROOM`], shared by both agents.
pub fn serving_agents(
    domain: &Domain,
    robot_tasks: Vec<TaskSpec>,
    human_tasks: Vec<TaskSpec>,
) -> Agents {
    let state = WorldState::new().with("glass", ROOM, Fact::Unset);
    let mut agents = Agents::new();
    agents.set_state(ROBOT, state.clone());
    agents.set_state(HUMAN, state);
    agents.add_tasks(domain, ROBOT, robot_tasks).expect("robot tasks");
    agents.add_tasks(domain, HUMAN, human_tasks).expect("human tasks");
    agents
}
