// ==============================================================================
// main.rs - Cluster Processor Entry Point
// ==============================================================================
// Description: Runs one project's cluster assignment synchronously, without
//              the job queue, and prints the result as JSON
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cluster_processor::engine::{CommandEngine, ReferenceDatabase};
use cluster_processor::job_processor::JobProcessor;
use cluster_processor::models::{EngineArgs, WorkUnit};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Project hash to process
    #[arg(short, long)]
    project_hash: String,

    /// Sample hash (repeat for each sample, in submission order)
    #[arg(long = "hash", required = true)]
    hashes: Vec<String>,

    /// Client filename for a sample, as HASH=FILENAME
    #[arg(long = "name", value_parser = parse_name)]
    names: Vec<(String, String)>,

    /// Storage root holding json/ and poppunk_output/
    #[arg(short, long, env = "STORAGE_ROOT", default_value = "./storage")]
    storage: PathBuf,

    /// Reference database for the clustering engine
    #[arg(short, long, env = "REFERENCE_DB")]
    reference_db: PathBuf,

    /// Clustering engine executable
    #[arg(short, long, env = "ENGINE_PROGRAM")]
    engine_program: PathBuf,

    /// Species / database profile
    #[arg(long, env = "ENGINE_SPECIES")]
    species: String,

    /// Extra arguments passed to the engine
    #[arg(last = true)]
    extra_args: Vec<String>,
}

fn parse_name(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(hash, name)| !hash.is_empty() && !name.is_empty())
        .map(|(hash, name)| (hash.to_string(), name.to_string()))
        .ok_or_else(|| format!("expected HASH=FILENAME, got {:?}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cluster_processor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    let args = Args::parse();
    info!("Cluster Processor starting for project {}", args.project_hash);

    let unit = WorkUnit {
        sample_hashes: args.hashes,
        project_hash: args.project_hash,
        names: args.names.into_iter().collect::<BTreeMap<_, _>>(),
        storage_root: args.storage,
        engine: EngineArgs {
            species: args.species,
            extra_args: args.extra_args,
        },
    };

    let processor = JobProcessor::new(
        Arc::new(CommandEngine::new(args.engine_program)),
        ReferenceDatabase::new(args.reference_db),
    );

    let job_id = format!("standalone-{}", uuid::Uuid::new_v4());
    let result = processor
        .run_job(&job_id, &unit)
        .await
        .with_context(|| format!("Project {} failed", unit.project_hash))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialise result")?
    );
    info!("Project {} complete ({} samples)", unit.project_hash, result.len());
    Ok(())
}
