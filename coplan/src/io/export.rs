//! JSON export of solution graphs and policies with schema validation.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::causal::{CausalLinks, Link};
use crate::core::graph::{NodeId, PlanGraph};

const SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/plan_graph/v1.schema.json"
));

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedNode {
    pub id: NodeId,
    pub name: String,
    pub params: Vec<String>,
    pub agent: String,
    /// The abstract task this action was decomposed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decompo_number: Option<usize>,
    #[serde(default)]
    pub previous: Option<NodeId>,
    pub next: Vec<NodeId>,
}

/// Reachable part of a plan graph, optionally with its policy cost and
/// causal links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanExport {
    pub version: u32,
    pub root: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    pub nodes: Vec<ExportedNode>,
    pub solutions: Vec<NodeId>,
    pub supports: Vec<Link>,
    pub threats: Vec<Link>,
}

impl PlanExport {
    /// Snapshot the nodes reachable from BEGIN. Recorded solutions that are
    /// still reachable (not collapsed away by a policy) become `solutions`.
    pub fn from_graph(graph: &PlanGraph) -> Self {
        let reachable = graph.reachable();
        let nodes = reachable
            .iter()
            .map(|id| {
                let node = &graph[*id];
                ExportedNode {
                    id: node.id,
                    name: node.name.clone(),
                    params: node.params.clone(),
                    agent: node.agent.clone(),
                    why: node.why.as_ref().map(|task| task.to_string()),
                    decompo_number: node.decompo_number,
                    previous: node.previous,
                    next: node.next.clone(),
                }
            })
            .collect();
        let reachable: HashSet<NodeId> = reachable.into_iter().collect();
        let solutions = graph
            .solutions()
            .iter()
            .copied()
            .filter(|id| reachable.contains(id) && graph[*id].is_leaf())
            .collect();
        Self {
            version: EXPORT_VERSION,
            root: graph.root(),
            cost: None,
            nodes,
            solutions,
            supports: Vec::new(),
            threats: Vec::new(),
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_causal_links(mut self, links: &CausalLinks) -> Self {
        self.supports = links.supports.clone();
        self.threats = links.threats.clone();
        self
    }

    pub fn node(&self, id: NodeId) -> Option<&ExportedNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// Load and validate an export from disk (schema + link consistency).
pub fn load_export(path: &Path) -> Result<PlanExport> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read export {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse export {}", path.display()))?;
    validate_schema(&value)?;
    let export: PlanExport = serde_json::from_value(value)
        .with_context(|| format!("deserialize export {}", path.display()))?;
    validate_links(&export)?;
    Ok(export)
}

/// Write an export to disk (pretty JSON, atomic replace).
pub fn write_export(path: &Path, export: &PlanExport) -> Result<()> {
    let value = serde_json::to_value(export).context("serialize export")?;
    validate_schema(&value)?;
    let mut buf = serde_json::to_string_pretty(&value).context("format export")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

fn validate_schema(export: &Value) -> Result<()> {
    let schema_value: Value = serde_json::from_str(SCHEMA).context("parse export schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(export) {
        let messages = compiled
            .iter_errors(export)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "export schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn validate_links(export: &PlanExport) -> Result<()> {
    let mut errors = Vec::new();
    let by_id: BTreeMap<NodeId, &ExportedNode> =
        export.nodes.iter().map(|node| (node.id, node)).collect();
    if by_id.len() != export.nodes.len() {
        errors.push("duplicate node ids".to_string());
    }
    match by_id.get(&export.root) {
        None => errors.push(format!("root {} is not exported", export.root)),
        Some(root) if root.previous.is_some() => {
            errors.push(format!("root {} has a predecessor", export.root));
        }
        Some(_) => {}
    }
    for node in &export.nodes {
        for child in &node.next {
            match by_id.get(child) {
                None => errors.push(format!("node {} links to missing node {}", node.id, child)),
                Some(next) if next.previous != Some(node.id) => errors.push(format!(
                    "node {} does not point back at its predecessor {}",
                    child, node.id
                )),
                Some(_) => {}
            }
        }
    }
    let linked = export.solutions.iter().chain(
        export
            .supports
            .iter()
            .chain(&export.threats)
            .flat_map(|link| [&link.source, &link.target]),
    );
    for id in linked {
        if !by_id.contains_key(id) {
            errors.push(format!("reference to missing node {}", id));
        }
    }
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("export links failed: {}", errors.join("; ")))
}
