// ==============================================================================
// handlers.rs - HTTP Request Handlers
// ==============================================================================
// Description: Sketch intake, job status and result endpoints
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use cluster_processor::models::WorkUnit;
use cluster_processor::queue::JobResult;
use cluster_processor::sketch::decode_sketch;
use cluster_processor::store::{validate_key, PutOutcome};
use cluster_processor::ClusterError;

use crate::models::{ApiInfoResponse, ApiResponse, HealthResponse, ReadinessResponse, SubmitRequest};
use crate::state::AppState;

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Root endpoint - API information
pub async fn root() -> Json<ApiInfoResponse> {
    Json(ApiInfoResponse {
        service: "Cluster Assignment API Gateway",
        version: SERVICE_VERSION,
        endpoints: vec![
            "/health - Health check",
            "/ready - Readiness check",
            "/version - Service versions",
            "/poppunk - Submit sketches for cluster assignment (POST)",
            "/status/{project_hash} - Job status for a project (GET)",
            "/result/{project_hash} - Cluster assignments for a project (GET)",
        ],
    })
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: SERVICE_VERSION,
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let redis_ready = state.queue().ping().await.is_ok();
    let storage_ready = state.store().root().is_dir();
    let ready = redis_ready && storage_ready;

    let response = ReadinessResponse {
        ready,
        redis: redis_ready,
        storage: storage_ready,
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Service and processor versions
pub async fn report_version() -> Json<ApiResponse> {
    Json(ApiResponse::success(json!([
        {"name": "cluster-api-gateway", "version": SERVICE_VERSION},
        {"name": "cluster-processor", "version": cluster_processor::VERSION},
    ])))
}

/// Store submitted sketches and queue a cluster assignment job
pub async fn submit_poppunk(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let project_hash = project_key(&request.project_hash)?;
    if request.sketches.is_empty() {
        return Err(AppError::BadRequest("No sketches submitted".to_string()));
    }

    info!(
        "Received {} sketches for project {}",
        request.sketches.len(),
        project_hash
    );

    // Nothing is written while the queue is down
    state.queue().ping().await?;

    let sample_hashes: Vec<String> = request.sketches.keys().cloned().collect();
    let store = state.store().clone();
    let sketches = request.sketches;
    tokio::task::spawn_blocking(move || -> cluster_processor::Result<()> {
        // Validate every sketch before the first write
        for (hash, sketch) in &sketches {
            decode_sketch(hash, sketch)?;
        }
        for (hash, sketch) in &sketches {
            match store.put_input(hash, sketch)? {
                PutOutcome::Stored => debug!("Stored sketch {}", hash),
                PutOutcome::AlreadyPresent => {}
                PutOutcome::Conflict => warn!("Kept existing sketch for {}", hash),
            }
        }
        Ok(())
    })
    .await
    .map_err(|e| AppError::Internal(format!("Sketch storage task failed: {}", e)))??;

    let unit = WorkUnit {
        sample_hashes,
        project_hash: project_hash.clone(),
        names: request.names,
        storage_root: state.store().root().to_path_buf(),
        engine: state.engine().clone(),
    };
    let job_id = state.queue().enqueue(&unit).await?;
    state.registry().record_job(&project_hash, &job_id).await?;

    info!("Project {} queued as job {}", project_hash, job_id);
    Ok(Json(ApiResponse::success(job_id)))
}

/// Status of the latest job for a project
pub async fn get_status(
    State(state): State<AppState>,
    Path(project_hash): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    let project_hash = project_key(&project_hash)?;
    state.queue().ping().await?;
    let status = state.registry().status_for_project(&project_hash).await?;
    Ok(Json(ApiResponse::success(status.as_str())))
}

/// Result of the latest job for a project
pub async fn get_result(
    State(state): State<AppState>,
    Path(project_hash): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    let project_hash = project_key(&project_hash)?;
    state.queue().ping().await?;
    match state.registry().result_for_project(&project_hash).await? {
        JobResult::Ready(entries) => Ok(Json(ApiResponse::success(entries))),
        JobResult::Pending => Err(AppError::NotReady),
    }
}

/// Project hashes name output directories, so they follow the store's key rules
fn project_key(raw: &str) -> Result<String, AppError> {
    let project_hash = raw.trim();
    if project_hash.is_empty() {
        return Err(AppError::BadRequest("projectHash must not be empty".to_string()));
    }
    validate_key(project_hash, "projectHash")?;
    Ok(project_hash.to_string())
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    NotReady,
    BadRequest(String),
    Unavailable(String),
    JobFailed(String),
    Internal(String),
}

impl From<ClusterError> for AppError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::UnknownProject(_) | ClusterError::UnknownJob(_) => {
                AppError::NotFound("Unknown project hash".to_string())
            }
            ClusterError::NotFound(_) => AppError::NotFound(err.to_string()),
            ClusterError::QueueUnreachable(_) => AppError::Unavailable(err.to_string()),
            ClusterError::InvalidInput(_) | ClusterError::InvalidSketch { .. } => {
                AppError::BadRequest(err.to_string())
            }
            ClusterError::JobFailed { .. } => AppError::JobFailed(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::NotReady => (StatusCode::OK, "Result not ready yet".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unavailable(msg) => {
                error!("{}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::JobFailed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(ApiResponse::failure(error_message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_router;
    use axum::body::Body;
    use axum::http::{header, Request};
    use cluster_processor::models::{ClusterEntry, EngineArgs};
    use cluster_processor::queue::{JobQueue, MemoryBackend, QueueBackend};
    use cluster_processor::store::ProjectStore;
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Harness {
        _dir: TempDir,
        backend: Arc<MemoryBackend>,
        state: AppState,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let queue = JobQueue::new(backend.clone() as Arc<dyn QueueBackend>);
        let engine = EngineArgs {
            species: "Streptococcus pneumoniae".to_string(),
            extra_args: Vec::new(),
        };
        let state = AppState::from_parts(ProjectStore::new(dir.path()), queue, engine);
        Harness {
            _dir: dir,
            backend,
            state,
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn submission(project: &str) -> Value {
        json!({
            "projectHash": project,
            "sketches": {
                "hash_b": {"14": ["0x1f"], "bases": [0.25, 0.25]},
                "hash_a": {"14": ["0x2e"], "bases": [0.25, 0.25]}
            },
            "names": {"hash_a": "sample_a.fa"}
        })
    }

    #[tokio::test]
    async fn test_submit_stores_and_queues() {
        let h = harness();
        let (status, body) = send(&h.state, post_json("/poppunk", submission("p1"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        let job_id = body["data"].as_str().unwrap().to_string();

        // Sketches are stored raw, in the store's input area
        assert!(h.state.store().get_input("hash_a").is_ok());
        assert!(h.state.store().get_input("hash_b").is_ok());

        // Queue holds the job with hashes in submission order
        let (queued_id, unit) = h
            .state
            .queue()
            .dequeue(std::time::Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queued_id, job_id);
        assert_eq!(unit.sample_hashes, vec!["hash_b", "hash_a"]);
        assert_eq!(unit.names.get("hash_a").map(String::as_str), Some("sample_a.fa"));
        assert_eq!(unit.storage_root, h.state.store().root());

        let (status, body) = send(&h.state, get("/status/p1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "queued");
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_sketches() {
        let h = harness();
        let (status, body) = send(
            &h.state,
            post_json("/poppunk", json!({"projectHash": "p1", "sketches": {}})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "failure");
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_submit_rejects_malformed_sketch_before_storing() {
        let h = harness();
        let request = json!({
            "projectHash": "p1",
            "sketches": {"good": {"14": ["0x1"]}, "bad": {"14": ["0x1", "zz"]}}
        });
        let (status, _) = send(&h.state, post_json("/poppunk", request)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(h.state.store().get_input("good").is_err());
        assert!(matches!(
            h.state.registry().lookup_job("p1").await,
            Err(ClusterError::UnknownProject(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_with_queue_down_writes_nothing() {
        let h = harness();
        h.backend.set_reachable(false);

        let (status, body) = send(&h.state, post_json("/poppunk", submission("p1"))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "failure");
        assert!(h.state.store().get_input("hash_a").is_err());
    }

    #[tokio::test]
    async fn test_submit_rejects_project_hash_outside_store() {
        let h = harness();
        let (status, body) = send(&h.state, post_json("/poppunk", submission("../x"))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "failure");
        assert!(h.state.store().get_input("hash_a").is_err());
        let queued = h
            .state
            .queue()
            .dequeue(std::time::Duration::from_millis(10))
            .await
            .unwrap();
        assert!(queued.is_none());

        let (status, _) = send(&h.state, get("/status/..")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&h.state, get("/result/a%2Fb")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_padded_project_hash_matches_submission() {
        let h = harness();
        let (status, _) = send(&h.state, post_json("/poppunk", submission("  p1 "))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&h.state, get("/status/%20p1%20")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "queued");
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let h = harness();

        let (status, body) = send(&h.state, get("/status/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"], json!(["Unknown project hash"]));

        let (status, _) = send(&h.state, get("/result/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_result_lifecycle() {
        let h = harness();
        let (_, body) = send(&h.state, post_json("/poppunk", submission("p1"))).await;
        let job_id = body["data"].as_str().unwrap().to_string();

        let (status, body) = send(&h.state, get("/result/p1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failure");
        assert_eq!(body["errors"], json!(["Result not ready yet"]));

        let entries = vec![
            ClusterEntry {
                hash: "hash_b".to_string(),
                cluster: "7".to_string(),
            },
            ClusterEntry {
                hash: "hash_a".to_string(),
                cluster: "3".to_string(),
            },
        ];
        h.state.queue().mark_started(&job_id).await.unwrap();
        h.state.queue().mark_finished(&job_id, &entries).await.unwrap();

        let (status, body) = send(&h.state, get("/result/p1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(
            body["data"],
            json!([
                {"hash": "hash_b", "cluster": "7"},
                {"hash": "hash_a", "cluster": "3"}
            ])
        );

        let (_, body) = send(&h.state, get("/status/p1")).await;
        assert_eq!(body["data"], "finished");
    }

    #[tokio::test]
    async fn test_failed_job_result_is_reported() {
        let h = harness();
        let (_, body) = send(&h.state, post_json("/poppunk", submission("p1"))).await;
        let job_id = body["data"].as_str().unwrap().to_string();
        h.state
            .queue()
            .mark_failed(&job_id, "Clustering engine failed: boom")
            .await
            .unwrap();

        let (status, body) = send(&h.state, get("/result/p1")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["errors"][0].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_readiness_reflects_queue() {
        let h = harness();
        let response = build_router(h.state.clone()).oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        h.backend.set_reachable(false);
        let response = build_router(h.state.clone()).oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
