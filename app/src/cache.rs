// ==============================================================================
// cache.rs - Versioned Cache Records
// ==============================================================================
// Description: Tagged JSON envelopes for per-project cache files, written
//              atomically (temp file + rename)
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Format:
//   {
//     "schema_version": 1,
//     "kind": "cluster_component_map",
//     "written_at": "2026-10-17T12:00:00Z",
//     "data": { ... }
//   }
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::error::{ClusterError, Result};
use crate::models::{ClusterEntry, ClusterToComponentMap, ExternalToEngineClusterMap};

/// Bump when the layout of any cached record changes
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// A value that can be persisted as a cache record
pub trait CacheRecord: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

impl CacheRecord for ClusterToComponentMap {
    const KIND: &'static str = "cluster_component_map";
}

impl CacheRecord for ExternalToEngineClusterMap {
    const KIND: &'static str = "external_to_engine_clusters";
}

impl CacheRecord for Vec<ClusterEntry> {
    const KIND: &'static str = "cluster_result";
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    schema_version: u32,
    kind: &'a str,
    written_at: DateTime<Utc>,
    data: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    schema_version: u32,
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Write a cache record, replacing any previous copy atomically
pub fn write_record<T: CacheRecord>(path: &Path, value: &T) -> Result<()> {
    let envelope = EnvelopeRef {
        schema_version: CACHE_SCHEMA_VERSION,
        kind: T::KIND,
        written_at: Utc::now(),
        data: value,
    };
    let bytes = serde_json::to_vec_pretty(&envelope)?;
    write_atomic(path, &bytes)?;
    debug!("Wrote {} cache record to {:?}", T::KIND, path);
    Ok(())
}

/// Read a cache record, rejecting other schema versions and record kinds
pub fn read_record<T: CacheRecord>(path: &Path) -> Result<T> {
    let raw = std::fs::read(path).map_err(|e| ClusterError::storage(path, e))?;
    let header: EnvelopeHeader = serde_json::from_slice(&raw)?;

    if header.schema_version != CACHE_SCHEMA_VERSION {
        return Err(ClusterError::CacheIncompatible {
            path: path.to_path_buf(),
            expected: format!("schema_version {}", CACHE_SCHEMA_VERSION),
            found: format!("schema_version {}", header.schema_version),
        });
    }
    if header.kind != T::KIND {
        return Err(ClusterError::CacheIncompatible {
            path: path.to_path_buf(),
            expected: T::KIND.to_string(),
            found: header.kind,
        });
    }

    Ok(serde_json::from_value(header.data)?)
}

/// Write bytes to a sibling temp file, sync, then rename over the target
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ClusterError::InvalidInput(format!("Not a file path: {:?}", path)))?;
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    };

    if let Err(e) = write() {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(ClusterError::storage(&tmp_path, e));
    }

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        ClusterError::storage(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_map() -> ClusterToComponentMap {
        let mut components = BTreeMap::new();
        components.insert("7".to_string(), "2".to_string());
        ClusterToComponentMap { components }
    }

    #[test]
    fn test_record_survives_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cluster_component_map.json");

        write_record(&path, &sample_map()).unwrap();
        let loaded: ClusterToComponentMap = read_record(&path).unwrap();

        assert_eq!(loaded, sample_map());
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("output_cluster.json");

        let first = vec![ClusterEntry { hash: "h1".to_string(), cluster: "3".to_string() }];
        let second = vec![ClusterEntry { hash: "h2".to_string(), cluster: "9".to_string() }];
        write_record(&path, &first).unwrap();
        write_record(&path, &second).unwrap();

        let loaded: Vec<ClusterEntry> = read_record(&path).unwrap();
        assert_eq!(loaded, second);

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temp files must be renamed away");
    }

    #[test]
    fn test_rejects_other_kind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        write_record(&path, &sample_map()).unwrap();

        let err = read_record::<Vec<ClusterEntry>>(&path).unwrap_err();
        assert!(matches!(err, ClusterError::CacheIncompatible { .. }));
    }

    #[test]
    fn test_rejects_other_schema_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            r#"{"schema_version": 0, "kind": "cluster_component_map", "data": {"components": {}}}"#,
        )
        .unwrap();

        let err = read_record::<ClusterToComponentMap>(&path).unwrap_err();
        match err {
            ClusterError::CacheIncompatible { found, .. } => assert_eq!(found, "schema_version 0"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
