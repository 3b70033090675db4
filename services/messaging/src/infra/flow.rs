use std::path::Path;

use anyhow::Context as _;
use tracing::info;

use crate::domain::flow::{FlowDefinition, FlowGraph};

/// Read and validate the flow definition file. Fails startup on any error.
pub fn load_flow(path: impl AsRef<Path>) -> anyhow::Result<FlowGraph> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read flow definition {}", path.display()))?;
    let graph = parse_flow(&raw).with_context(|| format!("load {}", path.display()))?;
    info!(path = %path.display(), nodes = graph.len(), "flow definition loaded");
    Ok(graph)
}

pub fn parse_flow(raw: &str) -> anyhow::Result<FlowGraph> {
    let definition: FlowDefinition =
        serde_json::from_str(raw).context("parse flow definition")?;
    FlowGraph::from_definition(definition).context("validate flow definition")
}
