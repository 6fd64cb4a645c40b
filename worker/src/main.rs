// ==============================================================================
// main.rs - Cluster Assignment Worker Process
// ==============================================================================
// Description: Background worker that runs cluster assignment jobs from the
//              Redis queue, one job at a time
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cluster_processor::engine::{CommandEngine, ReferenceDatabase};
use cluster_processor::job_processor::JobProcessor;
use cluster_processor::queue::{JobQueue, RedisBackend};
use cluster_processor::ClusterError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Config {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Reference database for the clustering engine
    #[arg(long, env = "REFERENCE_DB")]
    reference_db: PathBuf,

    /// Clustering engine executable
    #[arg(long, env = "ENGINE_PROGRAM")]
    engine_program: PathBuf,

    /// Identifies this worker's processing list; unique per worker
    #[arg(long, env = "WORKER_ID", default_value = "default")]
    worker_id: String,

    /// Seconds to block on the queue before polling again
    #[arg(long, env = "POLL_TIMEOUT_SECS", default_value_t = 1)]
    poll_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cluster_worker=info,cluster_processor=info")),
        )
        .with_target(false)
        .compact()
        .init();

    info!("Starting Cluster Worker v1.0.0");

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = Config::parse();

    let backend = RedisBackend::open(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    let queue = JobQueue::new(Arc::new(backend)).with_worker(&config.worker_id);
    queue.ping().await.context("Redis PING failed")?;
    info!("Connected to Redis as worker {}", config.worker_id);

    let reference_db = ReferenceDatabase::new(&config.reference_db);
    if let Err(e) = reference_db.verify() {
        error!("{}", e);
        return Err(anyhow::anyhow!("Reference database not accessible"));
    }
    info!("Reference database accessible at {:?}", config.reference_db);

    let processor = JobProcessor::new(Arc::new(CommandEngine::new(&config.engine_program)), reference_db)
        .with_queue(queue.clone());

    info!("Worker ready, waiting for jobs...");
    run(queue, processor, Duration::from_secs(config.poll_timeout_secs.max(1))).await
}

/// Poll the queue forever; each job runs to completion before the next pop.
/// Jobs left on this worker's processing list (by a crash or by a lost
/// state write) go back on the queue before the next pop.
async fn run(queue: JobQueue, processor: JobProcessor, poll_timeout: Duration) -> Result<()> {
    let mut needs_recovery = true;
    loop {
        if needs_recovery {
            match queue.recover().await {
                Ok(moved) => {
                    if moved > 0 {
                        info!("Requeued {} unfinished jobs", moved);
                    }
                    needs_recovery = false;
                }
                Err(e) => {
                    error!("Failed to requeue unfinished jobs: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            }
        }

        match queue.dequeue(poll_timeout).await {
            Ok(Some((job_id, unit))) => {
                info!("Received job {} for project {}", job_id, unit.project_hash);
                // Job failures are recorded on the job by the processor
                if let Err(e) = processor.run_job(&job_id, &unit).await {
                    warn!("Job {} did not complete: {}", job_id, e);
                    needs_recovery = true;
                }
            }
            Ok(None) => {}
            Err(ClusterError::QueueUnreachable(e)) => {
                error!("Queue unreachable: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Err(e) => {
                error!("Failed to dequeue job: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
