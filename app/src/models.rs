// ==============================================================================
// models.rs - Cluster Assignment Data Models
// ==============================================================================
// Description: Job payloads, results and cluster mapping value objects
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Job lifecycle state (owned by the queue, never set by the pipeline)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "started" => Some(JobStatus::Started),
            "finished" => Some(JobStatus::Finished),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Arguments forwarded to the clustering engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineArgs {
    /// Species / database profile the engine assigns against
    pub species: String,

    /// Extra command line arguments passed through verbatim
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Unit of work pushed onto the job queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Sample hashes submitted together, in submission order
    pub sample_hashes: Vec<String>,

    /// Client-chosen project identifier
    pub project_hash: String,

    /// Original client filenames by sample hash (used only for rehydration)
    #[serde(default)]
    pub names: BTreeMap<String, String>,

    /// Root of the content-addressed store the worker reads from
    pub storage_root: PathBuf,

    pub engine: EngineArgs,
}

/// One sample's final assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub hash: String,
    pub cluster: String,
}

/// External cluster id → engine-internal cluster id for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalToEngineClusterMap {
    pub clusters: BTreeMap<String, String>,

    /// Samples whose pairing disagreed with an earlier sample of the same
    /// external cluster
    #[serde(default)]
    pub conflicts: Vec<ClusterConflict>,
}

impl ExternalToEngineClusterMap {
    pub fn engine_cluster(&self, external: &str) -> Option<&str> {
        self.clusters.get(external).map(String::as_str)
    }
}

/// A rejected external → engine pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConflict {
    pub external: String,
    pub kept: String,
    pub rejected: String,
    pub sample: String,
}

/// Engine-internal cluster id → network component id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterToComponentMap {
    pub components: BTreeMap<String, String>,
}

impl ClusterToComponentMap {
    pub fn component(&self, engine_cluster: &str) -> Option<&str> {
        self.components.get(engine_cluster).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Sample hash → user-facing filename for the current submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilenameMap {
    names: BTreeMap<String, String>,
}

impl FilenameMap {
    /// Build the map for a submission; hashes without a client filename keep
    /// their hash as the display name
    pub fn for_submission(hashes: &[String], names: &BTreeMap<String, String>) -> Self {
        let names = hashes
            .iter()
            .map(|hash| {
                let name = names.get(hash).cloned().unwrap_or_else(|| hash.clone());
                (hash.clone(), name)
            })
            .collect();
        Self { names }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(h, n)| (h.as_str(), n.as_str()))
    }

    /// Filenames of the query samples
    pub fn query_names(&self) -> HashSet<&str> {
        self.names.values().map(String::as_str).collect()
    }
}
