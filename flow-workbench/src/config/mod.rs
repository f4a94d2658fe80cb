use crate::config::topology::{Topology, TopologyJson};
use anyhow::Context;
use std::fs;
use std::path::Path;

pub mod cli;
pub mod topology;

pub fn load_topology(path: Option<&Path>) -> anyhow::Result<Topology> {
    let Some(path) = path else {
        return Ok(Topology::default());
    };

    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read topology from {}", path.display()))?;
    let topology: TopologyJson = serde_json::from_str(&json)
        .with_context(|| format!("invalid topology JSON in {}", path.display()))?;
    Ok(topology.into())
}
