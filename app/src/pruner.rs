// ==============================================================================
// pruner.rs - Network Artifact Pruning
// ==============================================================================
// Description: Deletes component graphs unrelated to the submitted samples.
//              Irreversible; refuses to run before the result is committed.
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::error::{ClusterError, Result};
use crate::models::ClusterToComponentMap;
use crate::store::{
    component_file_name, ProjectStore, NETWORK_GRAPH_FILE, NETWORK_MAPPING_FILE, NETWORK_SUMMARY_FILE,
};

/// Files that survive every prune
pub const ALWAYS_KEEP: [&str; 3] = [NETWORK_SUMMARY_FILE, NETWORK_GRAPH_FILE, NETWORK_MAPPING_FILE];

/// File names kept and removed, each sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
}

/// Names of the files that must survive, given the engine clusters of the
/// result's samples
pub fn keep_set(engine_clusters: &BTreeSet<String>, components: &ClusterToComponentMap) -> BTreeSet<String> {
    let mut keep: BTreeSet<String> = ALWAYS_KEEP.iter().map(|name| name.to_string()).collect();

    for engine_cluster in engine_clusters {
        match components.component(engine_cluster) {
            Some(component) => {
                keep.insert(component_file_name(component));
            }
            None => warn!("No network component for engine cluster {}", engine_cluster),
        }
    }

    keep
}

pub fn prune_components(
    store: &ProjectStore,
    project_hash: &str,
    engine_clusters: &BTreeSet<String>,
    components: &ClusterToComponentMap,
) -> Result<PruneReport> {
    if !store.result_cache(project_hash)?.is_file() {
        return Err(ClusterError::InvalidInput(format!(
            "Refusing to prune project {} before its result is committed",
            project_hash
        )));
    }

    let keep = keep_set(engine_clusters, components);
    let dir = store.network_dir(project_hash)?;
    let entries = std::fs::read_dir(&dir).map_err(|e| ClusterError::storage(&dir, e))?;

    let mut report = PruneReport::default();
    for entry in entries {
        let entry = entry.map_err(|e| ClusterError::storage(&dir, e))?;
        let file_type = entry.file_type().map_err(|e| ClusterError::storage(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if keep.contains(&name) {
            report.kept.push(name);
        } else {
            std::fs::remove_file(entry.path()).map_err(|e| ClusterError::storage(entry.path(), e))?;
            debug!("Pruned {}", name);
            report.deleted.push(name);
        }
    }

    report.kept.sort();
    report.deleted.sort();
    info!(
        "Pruned network for project {}: kept {}, deleted {}",
        project_hash,
        report.kept.len(),
        report.deleted.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache;
    use crate::models::ClusterEntry;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn clusters(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn components() -> ClusterToComponentMap {
        ClusterToComponentMap {
            components: BTreeMap::from([
                ("7".to_string(), "1".to_string()),
                ("4".to_string(), "3".to_string()),
                ("9".to_string(), "2".to_string()),
            ]),
        }
    }

    fn project_with_network(files: &[&str]) -> (tempfile::TempDir, ProjectStore) {
        let dir = tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        store.output_dir("p1").unwrap();
        let result = vec![ClusterEntry {
            hash: "h1".to_string(),
            cluster: "12".to_string(),
        }];
        cache::write_record(&store.result_cache("p1").unwrap(), &result).unwrap();

        let network = store.network_dir("p1").unwrap();
        std::fs::create_dir_all(&network).unwrap();
        for name in files {
            std::fs::write(network.join(name), "x").unwrap();
        }
        (dir, store)
    }

    fn surviving(store: &ProjectStore) -> BTreeSet<String> {
        std::fs::read_dir(store.network_dir("p1").unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_surviving_set_is_exact() {
        let (_dir, store) = project_with_network(
            &[
                "network_cytoscape.csv",
                "network_cytoscape.graphml",
                "cluster_component_map.json",
                "network_component_1.graphml",
                "network_component_2.graphml",
                "network_component_3.graphml",
                "network_component_4.graphml",
                "network_cytoscape.log",
            ],
        );

        let report = prune_components(&store, "p1", &clusters(&["7", "4"]), &components()).unwrap();

        let expected: BTreeSet<String> = [
            "network_cytoscape.csv",
            "network_cytoscape.graphml",
            "cluster_component_map.json",
            "network_component_1.graphml",
            "network_component_3.graphml",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(surviving(&store), expected);
        assert_eq!(
            report.deleted,
            vec![
                "network_component_2.graphml",
                "network_component_4.graphml",
                "network_cytoscape.log"
            ]
        );
        assert_eq!(report.kept.len(), 5);
    }

    #[test]
    fn test_unmapped_cluster_is_skipped() {
        let (_dir, store) =
            project_with_network(&["network_component_1.graphml", "network_component_2.graphml"]);

        let report = prune_components(&store, "p1", &clusters(&["7", "77"]), &components()).unwrap();

        assert_eq!(report.kept, vec!["network_component_1.graphml"]);
        assert_eq!(report.deleted, vec!["network_component_2.graphml"]);
    }

    #[test]
    fn test_directories_are_left_alone() {
        let (_dir, store) = project_with_network(&["network_component_5.graphml"]);
        std::fs::create_dir(store.network_dir("p1").unwrap().join("nested")).unwrap();

        prune_components(&store, "p1", &clusters(&["7"]), &components()).unwrap();

        assert_eq!(surviving(&store), BTreeSet::from(["nested".to_string()]));
    }

    #[test]
    fn test_refuses_before_result_commit() {
        let dir = tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let network = store.network_dir("p1").unwrap();
        std::fs::create_dir_all(&network).unwrap();
        std::fs::write(network.join("network_component_1.graphml"), "x").unwrap();
        let err = prune_components(&store, "p1", &clusters(&["7"]), &components()).unwrap_err();

        assert!(matches!(err, ClusterError::InvalidInput(_)));
        assert!(network.join("network_component_1.graphml").exists());
    }

    #[test]
    fn test_samples_sharing_external_cluster_keep_both_components() {
        // Both samples sit in one external cluster but in two engine clusters
        let (_dir, store) = project_with_network(&[
            "network_component_1.graphml",
            "network_component_3.graphml",
            "network_component_2.graphml",
        ]);

        let report = prune_components(&store, "p1", &clusters(&["7", "4"]), &components()).unwrap();

        assert_eq!(
            report.kept,
            vec!["network_component_1.graphml", "network_component_3.graphml"]
        );
        assert_eq!(report.deleted, vec!["network_component_2.graphml"]);
    }
}
