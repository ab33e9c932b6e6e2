//! Orchestration: search, policy selection and causal analysis in one run.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::agents::Agents;
use crate::core::causal::{CausalLinks, analyze};
use crate::core::domain::Domain;
use crate::core::graph::{PlanGraph, PlanNode};
use crate::core::policy::{CostModel, Policy, select};
use crate::core::search::seek_plans;
use crate::io::config::PlannerConfig;
use crate::io::export::PlanExport;

/// Everything produced by one planning run.
#[derive(Debug, Clone)]
pub struct PlanningReport {
    /// Every discovered solution branch.
    pub graph: PlanGraph,
    /// `None` when no solution was found.
    pub policy: Option<Policy>,
    /// Links along the policy's cheapest branch, when attributes are tracked.
    pub causal: Option<CausalLinks>,
}

impl PlanningReport {
    pub fn solution_count(&self) -> usize {
        self.graph.solutions().len()
    }

    pub fn cost(&self) -> Option<f64> {
        self.policy.as_ref().map(|policy| policy.cost)
    }

    /// Export of the resolved policy, or of the raw search graph when there
    /// is none.
    pub fn export(&self) -> PlanExport {
        let export = match &self.policy {
            Some(policy) => PlanExport::from_graph(&policy.graph).with_cost(policy.cost),
            None => PlanExport::from_graph(&self.graph),
        };
        match &self.causal {
            Some(links) => export.with_causal_links(links),
            None => export,
        }
    }
}

/// A configured planner over one domain.
pub struct Planner<'d> {
    domain: &'d Domain,
    config: PlannerConfig,
    costs: CostModel,
}

impl<'d> Planner<'d> {
    pub fn new(domain: &'d Domain, config: PlannerConfig) -> Result<Self> {
        config.validate().context("invalid planner config")?;
        let costs = config.cost_model();
        Ok(Self {
            domain,
            config,
            costs,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn with_state_penalty<F>(mut self, penalty: F) -> Self
    where
        F: Fn(&Agents) -> f64 + Send + Sync + 'static,
    {
        self.costs = self.costs.with_state_penalty(penalty);
        self
    }

    pub fn with_sequence_penalty<F>(mut self, penalty: F) -> Self
    where
        F: Fn(&[&PlanNode]) -> f64 + Send + Sync + 'static,
    {
        self.costs = self.costs.with_sequence_penalty(penalty);
        self
    }

    /// Plan from `agents`, the initial joint snapshot with queues filled.
    pub fn solve(&self, agents: &Agents) -> Result<PlanningReport> {
        let roles = self.config.roles();
        let graph = seek_plans(self.domain, agents, roles, self.config.prediction)
            .context("search plans")?;
        if graph.solutions().is_empty() {
            warn!(
                controlled = %self.config.controlled_agent,
                "no plan completes the controlled agent's tasks"
            );
            return Ok(PlanningReport {
                graph,
                policy: None,
                causal: None,
            });
        }

        let policy = select(self.domain, agents, &graph, roles, &self.costs)
            .context("select policy")?;
        let causal = if self.config.tracked_attributes.is_empty() {
            None
        } else {
            let branch = policy.cheapest_branch();
            let links = analyze(
                self.domain,
                agents,
                &policy.graph,
                &branch,
                &self.config.tracked_attributes,
                &self.config.controlled_agent,
            )
            .context("analyze causal links")?;
            Some(links)
        };
        info!(
            solutions = graph.solutions().len(),
            cost = policy.cost,
            "planning complete"
        );
        Ok(PlanningReport {
            graph,
            policy: Some(policy),
            causal,
        })
    }
}

/// Plan with `config` and no penalties.
pub fn solve(domain: &Domain, agents: &Agents, config: PlannerConfig) -> Result<PlanningReport> {
    Planner::new(domain, config)?.solve(agents)
}
