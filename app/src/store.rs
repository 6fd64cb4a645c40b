// ==============================================================================
// store.rs - Content-Addressed Sketch and Project Output Store
// ==============================================================================
// Description: Filesystem store for input sketches (by content hash) and
//              per-project output artifacts (by project hash)
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Layout:
//   <root>/json/<hash>.json
//   <root>/poppunk_output/<project>/...
//   <root>/poppunk_output/<project>/network/...
// ==============================================================================

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cache;
use crate::error::{ClusterError, Result};
use crate::models::ClusterEntry;

const INPUT_DIR: &str = "json";
const OUTPUT_DIR: &str = "poppunk_output";
const NETWORK_DIR: &str = "network";

pub const QUERY_SKETCHES_FILE: &str = "query_sketches.json";
pub const PRIOR_CLUSTERING_FILE: &str = "previous_external_clusters.csv";
pub const EXTERNAL_TO_ENGINE_FILE: &str = "external_to_engine_clusters.json";
pub const RESULT_FILE: &str = "output_cluster.json";
pub const NETWORK_SUMMARY_FILE: &str = "network_cytoscape.csv";
pub const NETWORK_GRAPH_FILE: &str = "network_cytoscape.graphml";
pub const NETWORK_MAPPING_FILE: &str = "cluster_component_map.json";

/// Outcome of storing an input sketch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// First write for this hash
    Stored,
    /// Identical content already present; nothing written
    AlreadyPresent,
    /// Different content already stored under this hash; existing copy kept
    Conflict,
}

/// Handle on the storage root; cheap to clone, holds no cached state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a sketch under its content hash
    pub fn put_input(&self, hash: &str, sketch: &Value) -> Result<PutOutcome> {
        let path = self.input_path(hash)?;
        let bytes = serde_json::to_vec(sketch)?;

        match std::fs::read(&path) {
            Ok(existing) if existing == bytes => {
                debug!("Sketch {} already stored", hash);
                return Ok(PutOutcome::AlreadyPresent);
            }
            Ok(_) => {
                warn!("Sketch {} already stored with different content, keeping existing copy", hash);
                return Ok(PutOutcome::Conflict);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ClusterError::storage(&path, e)),
        }

        let dir = self.root.join(INPUT_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| ClusterError::storage(&dir, e))?;
        cache::write_atomic(&path, &bytes)?;

        debug!("Stored sketch {}", hash);
        Ok(PutOutcome::Stored)
    }

    /// Load a stored sketch
    pub fn get_input(&self, hash: &str) -> Result<Value> {
        let path = self.input_path(hash)?;
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ClusterError::NotFound(hash.to_string()));
            }
            Err(e) => return Err(ClusterError::storage(&path, e)),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Project output directory, created on first use
    pub fn output_dir(&self, project_hash: &str) -> Result<PathBuf> {
        let dir = self.project_dir(project_hash)?;
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| ClusterError::storage(&dir, e))?;
            info!("Created output directory {:?}", dir);
        }
        Ok(dir)
    }

    /// Network output directory for a project (not created here; the engine
    /// produces it)
    pub fn network_dir(&self, project_hash: &str) -> Result<PathBuf> {
        Ok(self.project_dir(project_hash)?.join(NETWORK_DIR))
    }

    pub fn query_sketches(&self, project_hash: &str) -> Result<PathBuf> {
        Ok(self.project_dir(project_hash)?.join(QUERY_SKETCHES_FILE))
    }

    pub fn prior_external_clustering(&self, project_hash: &str) -> Result<PathBuf> {
        Ok(self.project_dir(project_hash)?.join(PRIOR_CLUSTERING_FILE))
    }

    pub fn external_to_engine_clusters(&self, project_hash: &str) -> Result<PathBuf> {
        Ok(self.project_dir(project_hash)?.join(EXTERNAL_TO_ENGINE_FILE))
    }

    pub fn result_cache(&self, project_hash: &str) -> Result<PathBuf> {
        Ok(self.project_dir(project_hash)?.join(RESULT_FILE))
    }

    pub fn network_summary(&self, project_hash: &str) -> Result<PathBuf> {
        Ok(self.network_dir(project_hash)?.join(NETWORK_SUMMARY_FILE))
    }

    pub fn network_graph(&self, project_hash: &str) -> Result<PathBuf> {
        Ok(self.network_dir(project_hash)?.join(NETWORK_GRAPH_FILE))
    }

    pub fn network_mapping(&self, project_hash: &str) -> Result<PathBuf> {
        Ok(self.network_dir(project_hash)?.join(NETWORK_MAPPING_FILE))
    }

    pub fn network_component(&self, project_hash: &str, component: &str) -> Result<PathBuf> {
        Ok(self
            .network_dir(project_hash)?
            .join(component_file_name(component)))
    }

    /// Read back the cached final result of the last successful run
    pub fn load_cluster_result(&self, project_hash: &str) -> Result<Vec<ClusterEntry>> {
        let path = self.result_cache(project_hash)?;
        if !path.exists() {
            return Err(ClusterError::UnknownProject(project_hash.to_string()));
        }
        cache::read_record(&path)
    }

    fn input_path(&self, hash: &str) -> Result<PathBuf> {
        validate_key(hash, "sample hash")?;
        Ok(self.root.join(INPUT_DIR).join(format!("{}.json", hash)))
    }

    fn project_dir(&self, project_hash: &str) -> Result<PathBuf> {
        validate_key(project_hash, "project hash")?;
        Ok(self.root.join(OUTPUT_DIR).join(project_hash))
    }
}

/// File name of a network component graph
pub fn component_file_name(component: &str) -> String {
    format!("network_component_{}.graphml", component)
}

/// Keys become path components, so they must not escape the store root
pub fn validate_key(key: &str, what: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(ClusterError::InvalidInput(format!("Invalid {}: {:?}", what, key)))
    }
}
