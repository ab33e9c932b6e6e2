//! Planner configuration stored as TOML.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::{Aggregation, CostModel};
use crate::core::projection::Prediction;
use crate::core::search::Roles;

/// Planner configuration (TOML).
///
/// Missing fields default to a robot planning against a human.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Agent whose queue the search completes.
    pub controlled_agent: String,

    /// Agent whose responses are projected after every controlled action.
    pub uncontrolled_agent: String,

    /// How costs below a controlled-agent node combine.
    pub aggregation: Aggregation,

    /// Which uncontrolled responses are explored.
    pub prediction: Prediction,

    pub idle_cost: f64,
    pub wait_cost: f64,

    /// Cost of operators that report none themselves, by operator name.
    pub cost_table: BTreeMap<String, f64>,

    /// Attributes whose changes feed causal-link analysis. Empty disables it.
    pub tracked_attributes: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            controlled_agent: "robot".to_string(),
            uncontrolled_agent: "human".to_string(),
            aggregation: Aggregation::default(),
            prediction: Prediction::default(),
            idle_cost: 0.0,
            wait_cost: 0.0,
            cost_table: BTreeMap::new(),
            tracked_attributes: Vec::new(),
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.controlled_agent.trim().is_empty() {
            return Err(anyhow!("controlled_agent must be non-empty"));
        }
        if self.uncontrolled_agent.trim().is_empty() {
            return Err(anyhow!("uncontrolled_agent must be non-empty"));
        }
        if self.controlled_agent == self.uncontrolled_agent {
            return Err(anyhow!(
                "controlled_agent and uncontrolled_agent must differ (both are '{}')",
                self.controlled_agent
            ));
        }
        if !self.idle_cost.is_finite() {
            return Err(anyhow!("idle_cost must be finite"));
        }
        if !self.wait_cost.is_finite() {
            return Err(anyhow!("wait_cost must be finite"));
        }
        for (operator, cost) in &self.cost_table {
            if !cost.is_finite() {
                return Err(anyhow!("cost_table.{} must be finite", operator));
            }
        }
        Ok(())
    }

    pub fn roles(&self) -> Roles<'_> {
        Roles {
            controlled: &self.controlled_agent,
            uncontrolled: &self.uncontrolled_agent,
        }
    }

    /// Cost model without penalties.
    pub fn cost_model(&self) -> CostModel {
        let mut costs = CostModel::new();
        costs.idle_cost = self.idle_cost;
        costs.wait_cost = self.wait_cost;
        costs.aggregation = self.aggregation;
        costs.table = self
            .cost_table
            .iter()
            .map(|(name, cost)| (name.clone(), *cost))
            .collect();
        costs
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlannerConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlannerConfig> {
    if !path.exists() {
        let cfg = PlannerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlannerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlannerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PlannerConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("planner.toml");
        let mut cfg = PlannerConfig {
            aggregation: Aggregation::Min,
            prediction: Prediction::FirstApplicable,
            idle_cost: 0.5,
            tracked_attributes: vec!["holding".to_string()],
            ..PlannerConfig::default()
        };
        cfg.cost_table.insert("pour_tea".to_string(), 7.0);
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("planner.toml");
        fs::write(&path, "aggregation = \"min\"\n[cost_table]\nwave = 2.5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.aggregation, Aggregation::Min);
        assert_eq!(cfg.controlled_agent, "robot");
        assert_eq!(cfg.cost_model().table.get("wave"), Some(&2.5));
    }

    #[test]
    fn rejects_identical_roles() {
        let cfg = PlannerConfig {
            uncontrolled_agent: "robot".to_string(),
            ..PlannerConfig::default()
        };
        let err = cfg.validate().expect_err("same agent");
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn rejects_non_finite_costs() {
        let mut cfg = PlannerConfig::default();
        cfg.cost_table.insert("pick".to_string(), f64::NAN);
        assert!(cfg.validate().is_err());
    }
}
