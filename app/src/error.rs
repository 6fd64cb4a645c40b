// ==============================================================================
// error.rs - Cluster Pipeline Error Types
// ==============================================================================
// Description: Error taxonomy shared by store, queue and pipeline stages
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// Result type for cluster pipeline operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors raised while storing inputs, tracking jobs or running a job
#[derive(Error, Debug)]
pub enum ClusterError {
    /// I/O failure reading or writing the store or a cache file
    #[error("Storage fault at {path:?}")]
    StorageFault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Sample sketch not present in the store
    #[error("Sketch not found for hash {0}")]
    NotFound(String),

    /// No job was ever recorded for this project hash
    #[error("Unknown project hash: {0}")]
    UnknownProject(String),

    /// Job id has no record on the queue backend
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// Queue backend could not be reached
    #[error("Queue unreachable: {0}")]
    QueueUnreachable(String),

    /// Queue backend reachable but the command failed
    #[error("Queue command failed: {0}")]
    Queue(String),

    /// The clustering engine call failed
    #[error("Clustering engine failed: {0}")]
    EngineFailure(String),

    /// Submitted hash absent from the prior external clustering table
    #[error("Sample {hash} missing from prior external clustering file {path:?}")]
    MissingPriorClusteringEntry { hash: String, path: PathBuf },

    /// Job ended in the failed state
    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// Sketch payload could not be decoded
    #[error("Invalid sketch {hash}: {reason}")]
    InvalidSketch { hash: String, reason: String },

    /// Caller supplied an unusable value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network artifacts disagree with the summary table
    #[error("Network artifact error: {0}")]
    NetworkArtifact(String),

    /// Cache file written by an incompatible schema or for another record kind
    #[error("Cache {path:?} incompatible: expected {expected}, found {found}")]
    CacheIncompatible {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// A blocking stage panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),
}

impl ClusterError {
    /// Wrap an I/O error with the path it occurred on
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ClusterError::StorageFault {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_fault_keeps_path() {
        let err = ClusterError::storage(
            "/tmp/missing.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.json"));
    }

    #[test]
    fn test_storage_fault_display_leaves_cause_to_source() {
        let err = ClusterError::storage(
            "/data/p1",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.to_string().contains("denied"));
        assert_eq!(
            std::error::Error::source(&err).map(|cause| cause.to_string()),
            Some("denied".to_string())
        );
    }
}
