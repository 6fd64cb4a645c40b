// ==============================================================================
// registry.rs - Project → Job Registry
// ==============================================================================
// Description: Maps a client project hash to the id of its latest job so
//              status and result can be requested by project
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use tracing::debug;

use crate::error::{ClusterError, Result};
use crate::models::JobStatus;
use crate::queue::{JobQueue, JobResult};

/// Redis hash holding project hash → job id
pub const REGISTRY_KEY: &str = "cluster:project:job";

/// Latest job per project; resubmitting a project replaces its entry
#[derive(Clone)]
pub struct ProjectJobRegistry {
    queue: JobQueue,
}

impl ProjectJobRegistry {
    /// Shares the queue's backend
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    pub async fn record_job(&self, project_hash: &str, job_id: &str) -> Result<()> {
        self.queue
            .backend()
            .hset(REGISTRY_KEY, &[(project_hash, job_id.to_string())])
            .await?;
        debug!("Project {} now tracks job {}", project_hash, job_id);
        Ok(())
    }

    pub async fn lookup_job(&self, project_hash: &str) -> Result<String> {
        self.queue
            .backend()
            .hget(REGISTRY_KEY, project_hash)
            .await?
            .ok_or_else(|| ClusterError::UnknownProject(project_hash.to_string()))
    }

    pub async fn status_for_project(&self, project_hash: &str) -> Result<JobStatus> {
        let job_id = self.lookup_job(project_hash).await?;
        self.queue.status(&job_id).await
    }

    pub async fn result_for_project(&self, project_hash: &str) -> Result<JobResult> {
        let job_id = self.lookup_job(project_hash).await?;
        self.queue.result(&job_id).await
    }
}
