// ==============================================================================
// network.rs - Network Component Mapping
// ==============================================================================
// Description: Maps engine clusters to the arbitrary component ids the
//              network renderer gives its per-component graph files
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::cache;
use crate::error::{ClusterError, Result};
use crate::models::ClusterToComponentMap;
use crate::parsers::{GraphDocument, NetworkSummary};
use crate::store::ProjectStore;

fn component_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^network_component_(\d+)\.graphml$").expect("valid component regex")
    })
}

/// Component id encoded in a file name, if it is a component graph
pub fn component_id(file_name: &str) -> Option<&str> {
    component_pattern()
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Component graph files in the project's network directory, in ascending
/// numeric component order
pub fn component_files(store: &ProjectStore, project_hash: &str) -> Result<Vec<(String, PathBuf)>> {
    let dir = store.network_dir(project_hash)?;
    let entries = std::fs::read_dir(&dir).map_err(|e| ClusterError::storage(&dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ClusterError::storage(&dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(component) = component_id(name) {
            files.push((component.to_string(), entry.path()));
        }
    }

    files.sort_by_key(|(component, _)| (component.parse::<u64>().unwrap_or(u64::MAX), component.clone()));
    Ok(files)
}

/// Build and persist the cluster → component map for a project
pub fn build_network_mapping(store: &ProjectStore, project_hash: &str) -> Result<ClusterToComponentMap> {
    let summary = NetworkSummary::read(&store.network_summary(project_hash)?)?;
    let files = component_files(store, project_hash)?;
    info!(
        "Mapping {} component graphs against {} summary rows",
        files.len(),
        summary.len()
    );
    if summary.is_empty() && !files.is_empty() {
        return Err(ClusterError::NetworkArtifact(
            "network summary has no rows but component graphs were rendered".to_string(),
        ));
    }

    let mut map = ClusterToComponentMap::default();
    for (component, path) in files {
        let document = GraphDocument::read(&path)?;
        let label = document.first_label().ok_or_else(|| {
            ClusterError::NetworkArtifact(format!("component {} has no labelled node", component))
        })?;
        let cluster = summary.cluster_of(label).ok_or_else(|| {
            ClusterError::NetworkArtifact(format!(
                "sample {:?} from component {} is missing from the network summary",
                label, component
            ))
        })?;

        match map.components.get(cluster) {
            Some(existing) => warn!(
                "Cluster {} found in components {} and {}, keeping {}",
                cluster, existing, component, existing
            ),
            None => {
                debug!("Cluster {} -> component {}", cluster, component);
                map.components.insert(cluster.to_string(), component);
            }
        }
    }

    if map.is_empty() {
        warn!("Project {} rendered no network components", project_hash);
    }
    cache::write_record(&store.network_mapping(project_hash)?, &map)?;
    Ok(map)
}
