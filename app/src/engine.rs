// ==============================================================================
// engine.rs - Clustering Engine Boundary
// ==============================================================================
// Description: Trait for the external clustering engine plus an implementation
//              that drives it as a command line program
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Command contract:
//   <program> assign --sketches <file> --ref-db <db> --output <outdir>
//             --species <species> [extra args...]
//     writes <outdir>/query_clusters.csv (header; name,cluster)
//   <program> visualise --ref-db <db> --query-db <outdir> --output <outdir>/network
//     writes the network summary table and component graphs
// ==============================================================================

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::cache;
use crate::error::{ClusterError, Result};
use crate::models::EngineArgs;
use crate::store::QUERY_SKETCHES_FILE;

/// File the engine writes its per-query assignment table to
pub const QUERY_CLUSTERS_FILE: &str = "query_clusters.csv";

/// Reference database the engine assigns queries against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDatabase {
    path: PathBuf,
}

impl ReferenceDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fail early when the database is not mounted
    pub fn verify(&self) -> Result<()> {
        if self.path.exists() {
            Ok(())
        } else {
            Err(ClusterError::EngineFailure(format!(
                "Reference database not found at {:?}",
                self.path
            )))
        }
    }
}

/// Per-query output of an assignment run, index-aligned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineAssignment {
    pub names: Vec<String>,
    pub clusters: Vec<String>,
}

impl EngineAssignment {
    /// Reject output where names and clusters do not line up
    pub fn validate(&self) -> Result<()> {
        if self.names.len() != self.clusters.len() {
            return Err(ClusterError::EngineFailure(format!(
                "engine reported {} names but {} clusters",
                self.names.len(),
                self.clusters.len()
            )));
        }
        Ok(())
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .zip(self.clusters.iter())
            .map(|(n, c)| (n.as_str(), c.as_str()))
    }
}

/// Black-box clustering engine. All calls block.
pub trait ClusteringEngine: Send + Sync {
    /// Write decoded sketches in the engine's input format; returns the
    /// sample names the engine will report back, in its order
    fn materialize_sketches(&self, sketches: &[(String, Value)], outdir: &Path) -> Result<Vec<String>>;

    /// Assign each query sample to an engine-internal cluster
    fn assign_queries(
        &self,
        names: &[String],
        args: &EngineArgs,
        db: &ReferenceDatabase,
        outdir: &Path,
    ) -> Result<EngineAssignment>;

    /// Emit the network summary table and component graphs under
    /// `<outdir>/network`
    fn render_network(&self, args: &EngineArgs, db: &ReferenceDatabase, outdir: &Path) -> Result<()>;
}

/// Engine driven through an external executable
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, stage: &str, args: &[String]) -> Result<()> {
        debug!("Running {:?} {}", self.program, args.join(" "));

        let output = Command::new(&self.program).args(args).output().map_err(|e| {
            ClusterError::EngineFailure(format!("failed to launch {:?}: {}", self.program, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClusterError::EngineFailure(format!(
                "{} exited with {}: {}",
                stage,
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl ClusteringEngine for CommandEngine {
    fn materialize_sketches(&self, sketches: &[(String, Value)], outdir: &Path) -> Result<Vec<String>> {
        let mut collection = Map::with_capacity(sketches.len());
        for (name, sketch) in sketches {
            collection.insert(name.clone(), sketch.clone());
        }

        let path = outdir.join(QUERY_SKETCHES_FILE);
        cache::write_atomic(&path, &serde_json::to_vec(&Value::Object(collection))?)?;
        info!("Materialised {} sketches to {:?}", sketches.len(), path);

        Ok(sketches.iter().map(|(name, _)| name.clone()).collect())
    }

    fn assign_queries(
        &self,
        names: &[String],
        args: &EngineArgs,
        db: &ReferenceDatabase,
        outdir: &Path,
    ) -> Result<EngineAssignment> {
        let mut argv = vec![
            "assign".to_string(),
            "--sketches".to_string(),
            path_arg(&outdir.join(QUERY_SKETCHES_FILE)),
            "--ref-db".to_string(),
            path_arg(db.path()),
            "--output".to_string(),
            path_arg(outdir),
            "--species".to_string(),
            args.species.clone(),
        ];
        argv.extend(args.extra_args.iter().cloned());
        self.run("assign", &argv)?;

        let table = outdir.join(QUERY_CLUSTERS_FILE);
        let rows = crate::parsers::read_key_value_rows(&table).map_err(|e| {
            ClusterError::EngineFailure(format!("unreadable assignment table {:?}: {}", table, e))
        })?;

        let (reported, clusters): (Vec<String>, Vec<String>) = rows.into_iter().unzip();
        if reported.len() != names.len() {
            debug!(
                "Engine reported {} samples for {} submitted",
                reported.len(),
                names.len()
            );
        }

        let assignment = EngineAssignment {
            names: reported,
            clusters,
        };
        assignment.validate()?;
        Ok(assignment)
    }

    fn render_network(&self, args: &EngineArgs, db: &ReferenceDatabase, outdir: &Path) -> Result<()> {
        let mut argv = vec![
            "visualise".to_string(),
            "--ref-db".to_string(),
            path_arg(db.path()),
            "--query-db".to_string(),
            path_arg(outdir),
            "--output".to_string(),
            path_arg(&outdir.join("network")),
            "--species".to_string(),
            args.species.clone(),
        ];
        argv.extend(args.extra_args.iter().cloned());
        self.run("visualise", &argv)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted engine and GraphML fixtures for pipeline tests

    use super::*;
    use crate::store::{component_file_name, NETWORK_GRAPH_FILE, NETWORK_SUMMARY_FILE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Render a component graph in the layout the network renderer uses
    pub fn component_graphml(labels: &[&str]) -> String {
        let mut body = String::new();
        for (idx, label) in labels.iter().enumerate() {
            body.push_str(&format!(
                "    <node id=\"n{idx}\">\n      <data key=\"d0\">{label}</data>\n    </node>\n"
            ));
        }
        if labels.len() > 1 {
            body.push_str("    <edge source=\"n0\" target=\"n1\" />\n");
        }
        format!(
            "<?xml version='1.0' encoding='utf-8'?>\n\
             <graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n  \
             <key id=\"d0\" for=\"node\" attr.name=\"id\" attr.type=\"string\" />\n  \
             <graph edgedefault=\"undirected\">\n{body}  </graph>\n</graphml>\n"
        )
    }

    /// Engine that answers from fixed tables
    #[derive(Debug, Default)]
    pub struct FakeEngine {
        /// (sample name, engine cluster) reported by assign_queries
        pub assignments: Vec<(String, String)>,
        /// Reference samples and their engine clusters (summary table only)
        pub references: Vec<(String, String)>,
        /// (component id, node labels) emitted by render_network
        pub components: Vec<(String, Vec<String>)>,
        pub fail_assign: Option<String>,
        pub assign_calls: AtomicUsize,
    }

    impl FakeEngine {
        pub fn new(assignments: &[(&str, &str)]) -> Self {
            Self {
                assignments: assignments
                    .iter()
                    .map(|(n, c)| (n.to_string(), c.to_string()))
                    .collect(),
                ..Default::default()
            }
        }

        pub fn with_references(mut self, references: &[(&str, &str)]) -> Self {
            self.references = references
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect();
            self
        }

        pub fn with_component(mut self, component: &str, labels: &[&str]) -> Self {
            self.components.push((
                component.to_string(),
                labels.iter().map(|l| l.to_string()).collect(),
            ));
            self
        }

        pub fn failing(mut self, message: &str) -> Self {
            self.fail_assign = Some(message.to_string());
            self
        }
    }

    impl ClusteringEngine for FakeEngine {
        fn materialize_sketches(&self, sketches: &[(String, Value)], outdir: &Path) -> Result<Vec<String>> {
            let mut collection = Map::new();
            for (name, sketch) in sketches {
                collection.insert(name.clone(), sketch.clone());
            }
            cache::write_atomic(
                &outdir.join(QUERY_SKETCHES_FILE),
                &serde_json::to_vec(&Value::Object(collection))?,
            )?;
            Ok(sketches.iter().map(|(n, _)| n.clone()).collect())
        }

        fn assign_queries(
            &self,
            _names: &[String],
            _args: &EngineArgs,
            _db: &ReferenceDatabase,
            _outdir: &Path,
        ) -> Result<EngineAssignment> {
            self.assign_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.fail_assign {
                return Err(ClusterError::EngineFailure(message.clone()));
            }
            let (names, clusters) = self.assignments.iter().cloned().unzip();
            Ok(EngineAssignment { names, clusters })
        }

        fn render_network(&self, _args: &EngineArgs, _db: &ReferenceDatabase, outdir: &Path) -> Result<()> {
            let network = outdir.join("network");
            std::fs::create_dir_all(&network).map_err(|e| ClusterError::storage(&network, e))?;

            let mut summary = String::from("id,Cluster\n");
            for (name, cluster) in self.assignments.iter().chain(self.references.iter()) {
                summary.push_str(&format!("{},{}\n", name, cluster));
            }
            cache::write_atomic(&network.join(NETWORK_SUMMARY_FILE), summary.as_bytes())?;

            let all: Vec<&str> = self
                .components
                .iter()
                .flat_map(|(_, labels)| labels.iter().map(String::as_str))
                .collect();
            cache::write_atomic(&network.join(NETWORK_GRAPH_FILE), component_graphml(&all).as_bytes())?;

            for (component, labels) in &self.components {
                let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
                cache::write_atomic(
                    &network.join(component_file_name(component)),
                    component_graphml(&labels).as_bytes(),
                )?;
            }
            Ok(())
        }
    }
}
