// ==============================================================================
// pipeline.rs - Cluster Assignment Pipeline
// ==============================================================================
// Description: Assigns submitted samples to clusters with the engine and
//              reconciles them against the project's prior external clustering
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Steps (sequential, blocking):
//   1. ensure the project output directory
//   2. load + hex-decode each sketch
//   3. materialise sketches for the engine
//   4. engine query assignment
//   5. resolve hashes through the prior external clustering table
//   6. pair external → engine clusters per sample
//   7. write the external → engine cache
//   8. write the result cache
// Caches are only written once every earlier step has succeeded.
// ==============================================================================

use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache;
use crate::engine::{ClusteringEngine, EngineAssignment, ReferenceDatabase};
use crate::error::Result;
use crate::models::{ClusterConflict, ClusterEntry, EngineArgs, ExternalToEngineClusterMap};
use crate::parsers::ExternalClusterTable;
use crate::sketch::decode_sketch;
use crate::store::ProjectStore;

/// What one pipeline run produced
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentOutcome {
    /// Ordered {hash, external cluster} entries; this is the job result
    pub result: Vec<ClusterEntry>,
    pub external_to_engine: ExternalToEngineClusterMap,
    /// Engine cluster of every submitted sample the engine assigned,
    /// conflicting pairings included
    pub engine_clusters: BTreeSet<String>,
}

/// Worker-side assignment of one batch of samples
#[derive(Clone)]
pub struct ClusterAssignmentPipeline {
    store: ProjectStore,
    engine: Arc<dyn ClusteringEngine>,
    reference_db: ReferenceDatabase,
}

impl ClusterAssignmentPipeline {
    pub fn new(store: ProjectStore, engine: Arc<dyn ClusteringEngine>, reference_db: ReferenceDatabase) -> Self {
        Self {
            store,
            engine,
            reference_db,
        }
    }

    pub fn run(&self, hashes: &[String], project_hash: &str, args: &EngineArgs) -> Result<AssignmentOutcome> {
        info!("Assigning {} samples for project {}", hashes.len(), project_hash);

        let outdir = self.store.output_dir(project_hash)?;

        let sketches = self.load_decoded(hashes)?;
        let names = self.engine.materialize_sketches(&sketches, &outdir)?;

        let assignment = self
            .engine
            .assign_queries(&names, args, &self.reference_db, &outdir)?;
        assignment.validate()?;
        info!("Engine assigned {} queries", assignment.names.len());

        let table = ExternalClusterTable::read(&self.store.prior_external_clustering(project_hash)?)?;
        let result = table.resolve(hashes)?;

        let external_to_engine = pair_clusters(&table, &assignment)?;
        let engine_clusters = submitted_engine_clusters(hashes, &assignment);
        if !external_to_engine.conflicts.is_empty() {
            warn!(
                "Project {}: {} conflicting external/engine cluster pairings",
                project_hash,
                external_to_engine.conflicts.len()
            );
        }

        cache::write_record(
            &self.store.external_to_engine_clusters(project_hash)?,
            &external_to_engine,
        )?;
        cache::write_record(&self.store.result_cache(project_hash)?, &result)?;

        info!("Project {} assignment committed ({} entries)", project_hash, result.len());
        Ok(AssignmentOutcome {
            result,
            external_to_engine,
            engine_clusters,
        })
    }

    /// Each distinct hash is loaded and decoded exactly once
    fn load_decoded(&self, hashes: &[String]) -> Result<Vec<(String, Value)>> {
        let mut seen = HashSet::with_capacity(hashes.len());
        let mut sketches = Vec::with_capacity(hashes.len());

        for hash in hashes {
            if !seen.insert(hash.as_str()) {
                continue;
            }
            let raw = self.store.get_input(hash)?;
            sketches.push((hash.clone(), decode_sketch(hash, &raw)?));
        }

        Ok(sketches)
    }
}

fn submitted_engine_clusters(hashes: &[String], assignment: &EngineAssignment) -> BTreeSet<String> {
    let submitted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
    assignment
        .pairs()
        .filter(|(name, _)| submitted.contains(name))
        .map(|(_, cluster)| cluster.to_string())
        .collect()
}

/// Pair each engine-reported sample's external cluster with its engine
/// cluster. A disagreeing later pairing is recorded, the first one kept.
fn pair_clusters(table: &ExternalClusterTable, assignment: &EngineAssignment) -> Result<ExternalToEngineClusterMap> {
    let mut map = ExternalToEngineClusterMap::default();

    for (name, engine_cluster) in assignment.pairs() {
        let external = table.cluster_for(name)?;

        match map.clusters.get(external) {
            None => {
                map.clusters.insert(external.to_string(), engine_cluster.to_string());
            }
            Some(kept) if kept != engine_cluster => {
                warn!(
                    "External cluster {} already paired with engine cluster {}; sample {} reports {}",
                    external, kept, name, engine_cluster
                );
                map.conflicts.push(ClusterConflict {
                    external: external.to_string(),
                    kept: kept.clone(),
                    rejected: engine_cluster.to_string(),
                    sample: name.to_string(),
                });
            }
            Some(_) => {}
        }
    }

    Ok(map)
}
