// ==============================================================================
// state.rs - Application State Management
// ==============================================================================
// Description: Shared application state for the cluster assignment API
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use cluster_processor::models::EngineArgs;
use cluster_processor::queue::{JobQueue, RedisBackend};
use cluster_processor::registry::ProjectJobRegistry;
use cluster_processor::store::ProjectStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Content-addressed sketch store and per-project outputs
    store: ProjectStore,

    /// Job queue for cluster assignment work
    queue: JobQueue,

    /// Project hash to latest job id
    registry: ProjectJobRegistry,

    /// Engine arguments attached to every submitted job
    engine: EngineArgs,
}

impl AppState {
    /// Connect to Redis and prepare the storage root
    pub async fn new(redis_url: &str, storage_root: PathBuf, engine: EngineArgs) -> Result<Self> {
        let backend = RedisBackend::open(redis_url)
            .await
            .context("Failed to connect to Redis")?;
        let queue = JobQueue::new(Arc::new(backend));
        queue.ping().await.context("Redis PING failed")?;

        std::fs::create_dir_all(&storage_root)
            .with_context(|| format!("Failed to create storage root {:?}", storage_root))?;

        Ok(Self::from_parts(ProjectStore::new(storage_root), queue, engine))
    }

    /// Assemble state from already-built components
    pub fn from_parts(store: ProjectStore, queue: JobQueue, engine: EngineArgs) -> Self {
        let registry = ProjectJobRegistry::new(queue.clone());
        Self {
            inner: Arc::new(AppStateInner {
                store,
                queue,
                registry,
                engine,
            }),
        }
    }

    pub fn store(&self) -> &ProjectStore {
        &self.inner.store
    }

    pub fn queue(&self) -> &JobQueue {
        &self.inner.queue
    }

    pub fn registry(&self) -> &ProjectJobRegistry {
        &self.inner.registry
    }

    pub fn engine(&self) -> &EngineArgs {
        &self.inner.engine
    }
}
