// ==============================================================================
// main.rs - Cluster Assignment API Gateway Entry Point
// ==============================================================================
// Description: Axum web server accepting sketches and reporting job state
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cluster_processor::models::EngineArgs;

mod handlers;
mod models;
mod state;

use state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Config {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Root of the sketch store and project outputs
    #[arg(long, env = "STORAGE_ROOT", default_value = "./storage")]
    storage_root: PathBuf,

    /// Species the clustering engine assigns against
    #[arg(long, env = "ENGINE_SPECIES", default_value = "Streptococcus pneumoniae")]
    species: String,

    /// Port to listen on
    #[arg(long, env = "SERVER_PORT", default_value_t = 8099)]
    port: u16,

    /// Extra engine arguments attached to every job
    #[arg(last = true)]
    extra_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cluster_api_gateway=info,cluster_processor=info,tower_http=info")),
        )
        .with_target(false)
        .compact()
        .init();

    info!("Starting Cluster API Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = Config::parse();

    let engine = EngineArgs {
        species: config.species,
        extra_args: config.extra_args,
    };

    // Initialize application state
    let state = AppState::new(&config.redis_url, config.storage_root, engine)
        .await
        .context("Failed to initialize application state")?;

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("API Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    // Origins are configured via CORS_ALLOWED_ORIGINS env var (comma-separated)
    let cors_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());
    let allowed_origins: Vec<_> = cors_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_credentials(false)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/version", get(handlers::report_version))
        .route("/poppunk", post(handlers::submit_poppunk))
        .route("/status/{project_hash}", get(handlers::get_status))
        .route("/result/{project_hash}", get(handlers::get_result))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                // Sketch batches for large projects run to tens of MB
                .layer(DefaultBodyLimit::max(100 * 1024 * 1024)),
        )
        .with_state(state)
}
