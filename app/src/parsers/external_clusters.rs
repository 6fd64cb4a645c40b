// ==============================================================================
// external_clusters.rs - Prior External Clustering Table
// ==============================================================================
// Description: Reads the per-project table of sample hash → external cluster
//              produced by an earlier full run
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Format: CSV with header, first column sample hash, second external cluster
// Example:
//   sample,GPSC
//   4a8b...e1,12
//   91cc...07,55
// ==============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ClusterError, Result};
use crate::models::ClusterEntry;

/// Lookup table of previously established external clusters
#[derive(Debug, Clone)]
pub struct ExternalClusterTable {
    path: PathBuf,
    clusters: HashMap<String, String>,
}

impl ExternalClusterTable {
    /// Load the table; a missing file is a storage fault, not an empty table
    pub fn read(path: &Path) -> Result<Self> {
        let rows = super::read_key_value_rows(path)?;
        let mut clusters = HashMap::with_capacity(rows.len());

        for (sample, cluster) in rows {
            if let Some(existing) = clusters.get(&sample) {
                if existing != &cluster {
                    warn!(
                        "Sample {} listed twice in {:?} ({} and {}), keeping {}",
                        sample, path, existing, cluster, existing
                    );
                }
                continue;
            }
            clusters.insert(sample, cluster);
        }

        debug!("Loaded {} external cluster rows from {:?}", clusters.len(), path);
        Ok(Self {
            path: path.to_path_buf(),
            clusters,
        })
    }

    /// External cluster for one sample hash
    pub fn cluster_for(&self, hash: &str) -> Result<&str> {
        self.clusters
            .get(hash)
            .map(String::as_str)
            .ok_or_else(|| ClusterError::MissingPriorClusteringEntry {
                hash: hash.to_string(),
                path: self.path.clone(),
            })
    }

    /// Resolve every submitted hash, in submission order, each hash once
    pub fn resolve(&self, hashes: &[String]) -> Result<Vec<ClusterEntry>> {
        let mut seen = std::collections::HashSet::with_capacity(hashes.len());
        let mut entries = Vec::with_capacity(hashes.len());

        for hash in hashes {
            if !seen.insert(hash.as_str()) {
                continue;
            }
            entries.push(ClusterEntry {
                hash: hash.clone(),
                cluster: self.cluster_for(hash)?.to_string(),
            });
        }

        Ok(entries)
    }
}
