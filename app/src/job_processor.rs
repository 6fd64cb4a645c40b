// ==============================================================================
// job_processor.rs - Cluster Assignment Job Execution
// ==============================================================================
// Description: Runs one job through every stage (assignment, network render,
//              component mapping, pruning, rehydration) and records its state
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use std::sync::Arc;
use tracing::{error, info};

use crate::engine::{ClusteringEngine, ReferenceDatabase};
use crate::error::{ClusterError, Result};
use crate::models::{ClusterEntry, FilenameMap, WorkUnit};
use crate::network::build_network_mapping;
use crate::pipeline::ClusterAssignmentPipeline;
use crate::pruner::prune_components;
use crate::queue::JobQueue;
use crate::rehydrate::rehydrate_network;
use crate::store::ProjectStore;

/// Executes dequeued jobs; without a queue it runs standalone (no state
/// tracking, no progress messages)
#[derive(Clone)]
pub struct JobProcessor {
    engine: Arc<dyn ClusteringEngine>,
    reference_db: ReferenceDatabase,
    queue: Option<JobQueue>,
}

impl JobProcessor {
    pub fn new(engine: Arc<dyn ClusteringEngine>, reference_db: ReferenceDatabase) -> Self {
        Self {
            engine,
            reference_db,
            queue: None,
        }
    }

    pub fn with_queue(mut self, queue: JobQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Run a job and record started / finished / failed on the queue.
    /// The job is acknowledged only once its terminal state is written; if
    /// any state write fails it stays on the processing list for
    /// [`JobQueue::recover`].
    pub async fn run_job(&self, job_id: &str, unit: &WorkUnit) -> Result<Vec<ClusterEntry>> {
        if let Some(queue) = &self.queue {
            queue.mark_started(job_id).await?;
        }
        self.publish_progress(job_id, 0.0, "Starting processing").await;

        match self.process(job_id, unit).await {
            Ok(result) => {
                if let Some(queue) = &self.queue {
                    queue.mark_finished(job_id, &result).await?;
                    queue.acknowledge(job_id).await?;
                }
                info!("Job {} completed successfully", job_id);
                self.publish_progress(job_id, 100.0, "Processing complete").await;
                Ok(result)
            }
            Err(e) => {
                let message = error_chain(&e);
                error!("Job {} failed: {}", job_id, message);
                if let Some(queue) = &self.queue {
                    queue.mark_failed(job_id, &message).await?;
                    queue.acknowledge(job_id).await?;
                }
                self.publish_progress(job_id, 0.0, &format!("Failed: {}", message)).await;
                Err(e)
            }
        }
    }

    /// All stages for one project; blocking work runs off the async runtime
    pub async fn process(&self, job_id: &str, unit: &WorkUnit) -> Result<Vec<ClusterEntry>> {
        let project = unit.project_hash.clone();
        let store = ProjectStore::new(&unit.storage_root);
        info!(
            "Processing job {} for project {} ({} samples)",
            job_id,
            project,
            unit.sample_hashes.len()
        );

        self.publish_progress(job_id, 5.0, "Verifying reference database").await;
        self.reference_db.verify()?;

        // Steps 1-8: assignment, caches committed at the end
        self.publish_progress(job_id, 10.0, "Assigning clusters").await;
        let outcome = blocking("cluster assignment", {
            let pipeline =
                ClusterAssignmentPipeline::new(store.clone(), self.engine.clone(), self.reference_db.clone());
            let hashes = unit.sample_hashes.clone();
            let project = project.clone();
            let args = unit.engine.clone();
            move || pipeline.run(&hashes, &project, &args)
        })
        .await?;
        self.publish_progress(
            job_id,
            40.0,
            &format!("Assigned {} samples to clusters", outcome.result.len()),
        )
        .await;

        self.publish_progress(job_id, 45.0, "Rendering network").await;
        blocking("network render", {
            let engine = self.engine.clone();
            let db = self.reference_db.clone();
            let args = unit.engine.clone();
            let store = store.clone();
            let project = project.clone();
            move || engine.render_network(&args, &db, &store.output_dir(&project)?)
        })
        .await?;

        self.publish_progress(job_id, 60.0, "Mapping network components").await;
        let components = blocking("network mapping", {
            let store = store.clone();
            let project = project.clone();
            move || build_network_mapping(&store, &project)
        })
        .await?;

        // The result cache is already committed, so pruning may proceed
        self.publish_progress(job_id, 75.0, "Pruning unrelated components").await;
        let report = blocking("pruning", {
            let store = store.clone();
            let project = project.clone();
            let engine_clusters = outcome.engine_clusters.clone();
            move || prune_components(&store, &project, &engine_clusters, &components)
        })
        .await?;
        info!(
            "Job {}: kept {} network files, deleted {}",
            job_id,
            report.kept.len(),
            report.deleted.len()
        );

        self.publish_progress(job_id, 90.0, "Restoring sample filenames").await;
        let names = FilenameMap::for_submission(&unit.sample_hashes, &unit.names);
        blocking("rehydration", {
            let store = store.clone();
            let project = project.clone();
            move || rehydrate_network(&store, &project, &names)
        })
        .await?;

        Ok(outcome.result)
    }

    async fn publish_progress(&self, job_id: &str, progress_pct: f32, message: &str) {
        if let Some(queue) = &self.queue {
            // Progress is advisory; the queue logs delivery failures
            let _ = queue.publish_progress(job_id, progress_pct, message).await;
        }
    }
}

async fn blocking<T, F>(stage: &'static str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ClusterError::TaskFailed(format!("{}: {}", stage, e)))?
}

/// Error message followed by each source, ": "-separated
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
