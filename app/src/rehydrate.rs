// ==============================================================================
// rehydrate.rs - Filename Rehydration
// ==============================================================================
// Description: Replaces sample hashes in network artifacts with the client's
//              original filenames and tags graph nodes as query or reference
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache;
use crate::error::{ClusterError, Result};
use crate::models::FilenameMap;
use crate::network::component_files;
use crate::parsers::{graphml, GraphDocument};
use crate::store::{ProjectStore, NETWORK_MAPPING_FILE};

/// GraphML data key carrying the query/reference tag
pub const REF_QUERY_KEY: &str = "ref_query";

/// Rewrite every file under `root` (except the mapping cache), replacing
/// each hash with its filename. Returns the number of files changed.
pub fn replace_hashes(root: &Path, names: &FilenameMap) -> Result<usize> {
    // Longest hash first so a hash that prefixes another cannot split it
    let mut replacements: Vec<(&str, &str)> = names.iter().filter(|(hash, name)| hash != name).collect();
    replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
    let escaped: Vec<(&str, String)> = replacements
        .iter()
        .map(|(hash, name)| (*hash, graphml::escape(name)))
        .collect();
    let escaped: Vec<(&str, &str)> = escaped.iter().map(|(hash, name)| (*hash, name.as_str())).collect();

    // Collect first; rewrites create temp files in the same directories
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            ClusterError::storage(path, io)
        })?;
        if entry.file_type().is_file() && entry.file_name() != NETWORK_MAPPING_FILE {
            files.push(entry.into_path());
        }
    }

    let mut changed = 0;
    for path in files {
        let raw = std::fs::read(&path).map_err(|e| ClusterError::storage(&path, e))?;
        let Ok(text) = String::from_utf8(raw) else {
            warn!("Skipping non-text file {:?}", path);
            continue;
        };

        // Filenames land in GraphML as character data
        let is_graphml = path.extension().is_some_and(|ext| ext == "graphml");
        let rewritten = rewrite_lines(&text, if is_graphml { &escaped } else { &replacements });
        if rewritten != text {
            cache::write_atomic(&path, rewritten.as_bytes())?;
            debug!("Rehydrated {:?}", path);
            changed += 1;
        }
    }

    Ok(changed)
}

fn rewrite_lines(text: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(text.len());

    for line in text.lines() {
        let mut line = line.trim_end().to_string();
        for (hash, name) in replacements {
            if line.contains(hash) {
                line = line.replace(hash, name);
            }
        }
        out.push_str(&line);
        out.push('\n');
    }

    if !text.ends_with('\n') && out.ends_with('\n') {
        out.pop();
    }
    out
}

/// Tag every node of every component graph with `query` when its sample is
/// part of this submission, `ref` otherwise. Returns the nodes tagged.
pub fn add_query_ref_status(store: &ProjectStore, project_hash: &str, names: &FilenameMap) -> Result<usize> {
    let query_names = names.query_names();
    let mut tagged = 0;

    for (component, path) in component_files(store, project_hash)? {
        let mut document = GraphDocument::read(&path)?;
        tagged += document.annotate_nodes(REF_QUERY_KEY, |label| match label {
            Some(label) if query_names.contains(label) => "query",
            _ => "ref",
        })?;
        document.write(&path)?;
        debug!("Annotated component {}", component);
    }

    Ok(tagged)
}

/// Both rehydration passes over the project's network directory
pub fn rehydrate_network(store: &ProjectStore, project_hash: &str, names: &FilenameMap) -> Result<()> {
    let network = store.network_dir(project_hash)?;
    let changed = replace_hashes(&network, names)?;
    let tagged = add_query_ref_status(store, project_hash, names)?;
    info!(
        "Rehydrated project {}: {} files rewritten, {} nodes tagged",
        project_hash, changed, tagged
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::component_graphml;
    use crate::store::{component_file_name, NETWORK_SUMMARY_FILE};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn filename_map(pairs: &[(&str, &str)], hashes: &[&str]) -> FilenameMap {
        let names: BTreeMap<String, String> =
            pairs.iter().map(|(h, n)| (h.to_string(), n.to_string())).collect();
        let hashes: Vec<String> = hashes.iter().map(|h| h.to_string()).collect();
        FilenameMap::for_submission(&hashes, &names)
    }

    fn network_project() -> (tempfile::TempDir, ProjectStore, PathBuf) {
        let dir = tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        store.output_dir("p1").unwrap();
        let network = store.network_dir("p1").unwrap();
        std::fs::create_dir_all(&network).unwrap();
        (dir, store, network)
    }

    #[test]
    fn test_rewrite_preserves_lines_and_trims() {
        let out = rewrite_lines("id,Cluster  \n\nabc1,7\t\nabc12,8", &[("abc12", "long.fa"), ("abc1", "short.fa")]);
        assert_eq!(out, "id,Cluster\n\nshort.fa,7\nlong.fa,8");
    }

    #[test]
    fn test_no_mapped_hash_survives() {
        let (_dir, store, network) = network_project();
        std::fs::write(network.join(NETWORK_SUMMARY_FILE), "id,Cluster\nhash_a,7\nhash_b,7\nref1,9\n").unwrap();
        std::fs::write(
            network.join(component_file_name("1")),
            component_graphml(&["hash_a", "hash_b", "ref1"]),
        )
        .unwrap();
        let mapping = network.join(NETWORK_MAPPING_FILE);
        std::fs::write(&mapping, "{\"hash_a\": 1}").unwrap();

        let names = filename_map(&[("hash_a", "a.fa"), ("hash_b", "b.fa")], &["hash_a", "hash_b"]);
        let changed = replace_hashes(&network, &names).unwrap();

        assert_eq!(changed, 2);
        for entry in std::fs::read_dir(&network).unwrap() {
            let path = entry.unwrap().path();
            if path == mapping {
                continue;
            }
            let text = std::fs::read_to_string(&path).unwrap();
            assert!(!text.contains("hash_a") && !text.contains("hash_b"), "{:?}", path);
        }
        // The mapping cache is excluded
        assert_eq!(std::fs::read_to_string(&mapping).unwrap(), "{\"hash_a\": 1}");
    }

    #[test]
    fn test_nodes_tagged_query_or_ref() {
        let (_dir, store, network) = network_project();
        std::fs::write(
            network.join(component_file_name("1")),
            component_graphml(&["a.fa", "ref1"]),
        )
        .unwrap();
        std::fs::write(network.join(component_file_name("4")), component_graphml(&["h2"])).unwrap();

        // h2 has no client filename, so its node keeps the hash
        let names = filename_map(&[("h1", "a.fa")], &["h1", "h2"]);
        let tagged = add_query_ref_status(&store, "p1", &names).unwrap();
        assert_eq!(tagged, 3);

        let first = GraphDocument::read(&network.join(component_file_name("1"))).unwrap();
        assert!(first
            .as_str()
            .contains("<data key=\"d0\">a.fa</data>\n      <data key=\"ref_query\">query</data>"));
        assert!(first
            .as_str()
            .contains("<data key=\"d0\">ref1</data>\n      <data key=\"ref_query\">ref</data>"));

        let second = std::fs::read_to_string(network.join(component_file_name("4"))).unwrap();
        assert!(second.contains("<data key=\"ref_query\">query</data>"));
    }

    #[test]
    fn test_markup_in_filename_is_escaped_in_graphml_only() {
        let (_dir, store, network) = network_project();
        std::fs::write(network.join(NETWORK_SUMMARY_FILE), "id,Cluster\nh1,7\n").unwrap();
        std::fs::write(network.join(component_file_name("1")), component_graphml(&["h1", "ref1"])).unwrap();

        let names = filename_map(&[("h1", "a&b<c>.fa")], &["h1"]);
        rehydrate_network(&store, "p1", &names).unwrap();

        let summary = std::fs::read_to_string(network.join(NETWORK_SUMMARY_FILE)).unwrap();
        assert_eq!(summary, "id,Cluster\na&b<c>.fa,7\n");

        let text = std::fs::read_to_string(network.join(component_file_name("1"))).unwrap();
        assert!(text.contains("<data key=\"d0\">a&amp;b&lt;c&gt;.fa</data>"));
        assert!(!text.contains("a&b<c>"));

        let document = GraphDocument::read(&network.join(component_file_name("1"))).unwrap();
        assert_eq!(document.first_label(), Some("a&b<c>.fa"));
        assert!(document
            .as_str()
            .contains("a&amp;b&lt;c&gt;.fa</data>\n      <data key=\"ref_query\">query</data>"));
    }

    #[test]
    fn test_rehydrate_network_is_repeatable() {
        let (_dir, store, network) = network_project();
        std::fs::write(network.join(NETWORK_SUMMARY_FILE), "id,Cluster\nh1,7\n").unwrap();
        std::fs::write(network.join(component_file_name("1")), component_graphml(&["h1", "ref1"])).unwrap();

        let names = filename_map(&[("h1", "a.fa")], &["h1"]);
        rehydrate_network(&store, "p1", &names).unwrap();
        let once = std::fs::read_to_string(network.join(component_file_name("1"))).unwrap();
        rehydrate_network(&store, "p1", &names).unwrap();
        let twice = std::fs::read_to_string(network.join(component_file_name("1"))).unwrap();

        assert_eq!(once, twice);
        assert_eq!(once.matches("ref_query").count(), 2);
        assert!(once.contains("a.fa"));
    }
}
