// ==============================================================================
// network_summary.rs - Network Summary Table Parser
// ==============================================================================
// Description: Sample name → engine cluster lookup from the network CSV
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Format: CSV with header
//   id,Cluster
//   sample_a,7
//   sample_b,7
//   sample_c,12
// ==============================================================================

use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::Result;

/// Engine cluster per sample name, as written by the network renderer
#[derive(Debug, Clone, Default)]
pub struct NetworkSummary {
    clusters: HashMap<String, String>,
}

impl NetworkSummary {
    pub fn read(path: &Path) -> Result<Self> {
        let clusters: HashMap<String, String> =
            super::read_key_value_rows(path)?.into_iter().collect();
        debug!("Loaded {} network summary rows from {:?}", clusters.len(), path);
        Ok(Self { clusters })
    }

    /// Exact string match, no normalisation
    pub fn cluster_of(&self, sample_name: &str) -> Option<&str> {
        self.clusters.get(sample_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
