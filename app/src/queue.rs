// ==============================================================================
// queue.rs - Redis Job Queue
// ==============================================================================
// Description: Job submission, state tracking and progress publication over
//              a Redis list + per-job hash, shared by gateway and worker
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Keys:
//   cluster:job_queue            LIST of job ids (LPUSH / BLMOVE)
//   cluster:processing:{worker}  LIST of ids a worker has taken but not yet
//                                     brought to finished/failed
//   cluster:job:{id}             HASH status, payload, result, error,
//                                     created_at, started_at, ended_at
//   cluster:progress:{id}        pub/sub channel for progress messages
// ==============================================================================

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Direction, RedisError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ClusterError, Result};
use crate::models::{ClusterEntry, JobStatus, WorkUnit};

pub const QUEUE_KEY: &str = "cluster:job_queue";
const PROCESSING_PREFIX: &str = "cluster:processing:";
const DEFAULT_WORKER: &str = "default";
const JOB_PREFIX: &str = "cluster:job:";
const PROGRESS_PREFIX: &str = "cluster:progress:";

/// Minimal key-value/list/pub-sub surface the queue needs
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Push onto the head of a list
    async fn push(&self, list: &str, value: &str) -> Result<()>;

    /// Blocking move of the tail of `src` onto the head of `dst`
    async fn pop_move(&self, src: &str, dst: &str, timeout: Duration) -> Result<Option<String>>;

    /// Non-blocking move of the tail of `src` onto the head of `dst`
    async fn move_tail(&self, src: &str, dst: &str) -> Result<Option<String>>;

    /// Remove every occurrence of `value` from a list
    async fn remove(&self, list: &str, value: &str) -> Result<()>;

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn publish(&self, channel: &str, message: &str) -> Result<()>;
}

// ------------------------------------------------------------------------------
// Redis backend
// ------------------------------------------------------------------------------

/// Redis backend over one managed connection. Every operation PINGs first
/// so an unreachable server is reported straight away instead of retried;
/// the manager reconnects once the server is back.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn open(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| ClusterError::QueueUnreachable(format!("Invalid Redis URL: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| ClusterError::QueueUnreachable(e.to_string()))?;
        Ok(Self { conn })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| ClusterError::QueueUnreachable(e.to_string()))?;
        Ok(conn)
    }
}

fn command_error(e: RedisError) -> ClusterError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        ClusterError::QueueUnreachable(e.to_string())
    } else {
        ClusterError::Queue(e.to_string())
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    async fn ping(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    async fn push(&self, list: &str, value: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(list, value).await.map_err(command_error)
    }

    async fn pop_move(&self, src: &str, dst: &str, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        conn.blmove(src, dst, Direction::Right, Direction::Left, timeout.as_secs_f64())
            .await
            .map_err(command_error)
    }

    async fn move_tail(&self, src: &str, dst: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        conn.lmove(src, dst, Direction::Right, Direction::Left)
            .await
            .map_err(command_error)
    }

    async fn remove(&self, list: &str, value: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(list, 0, value).await.map_err(command_error)
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.hset_multiple::<_, _, _, ()>(key, fields)
            .await
            .map_err(command_error)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        conn.hget(key, field).await.map_err(command_error)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.publish::<_, _, ()>(channel, message)
            .await
            .map_err(command_error)
    }
}

// ------------------------------------------------------------------------------
// In-memory backend
// ------------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    published: Vec<(String, String)>,
}

impl MemoryState {
    fn move_tail(&mut self, src: &str, dst: &str) -> Option<String> {
        let value = self.lists.get_mut(src).and_then(VecDeque::pop_back)?;
        self.lists
            .entry(dst.to_string())
            .or_default()
            .push_front(value.clone());
        Some(value)
    }

    #[cfg(test)]
    fn list(&self, name: &str) -> Vec<String> {
        self.lists
            .get(name)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Process-local backend for tests and single-process runs
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    reachable: AtomicBool,
    pushed: Notify,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            reachable: AtomicBool::new(true),
            pushed: Notify::new(),
        }
    }

    /// Simulate the server going away (or coming back)
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Current contents of a list, head first
    #[cfg(test)]
    pub(crate) async fn list(&self, name: &str) -> Vec<String> {
        self.state.lock().await.list(name)
    }

    /// Messages published so far, as (channel, message)
    pub async fn published(&self) -> Vec<(String, String)> {
        self.state.lock().await.published.clone()
    }

    fn check(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClusterError::QueueUnreachable("memory backend offline".to_string()))
        }
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn push(&self, list: &str, value: &str) -> Result<()> {
        self.check()?;
        self.state
            .lock()
            .await
            .lists
            .entry(list.to_string())
            .or_default()
            .push_front(value.to_string());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop_move(&self, src: &str, dst: &str, timeout: Duration) -> Result<Option<String>> {
        self.check()?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.pushed.notified();
            if let Some(value) = self.state.lock().await.move_tail(src, dst) {
                return Ok(Some(value));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn move_tail(&self, src: &str, dst: &str) -> Result<Option<String>> {
        self.check()?;
        let moved = self.state.lock().await.move_tail(src, dst);
        if moved.is_some() {
            self.pushed.notify_waiters();
        }
        Ok(moved)
    }

    async fn remove(&self, list: &str, value: &str) -> Result<()> {
        self.check()?;
        if let Some(items) = self.state.lock().await.lists.get_mut(list) {
            items.retain(|item| item != value);
        }
        Ok(())
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock().await;
        let hash = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .await
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        self.check()?;
        self.state
            .lock()
            .await
            .published
            .push((channel.to_string(), message.to_string()));
        Ok(())
    }
}

// ------------------------------------------------------------------------------
// Job queue
// ------------------------------------------------------------------------------

/// Outcome of asking for a job's result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// Queued or still running
    Pending,
    /// Finished; the ordered assignment the pipeline returned
    Ready(Vec<ClusterEntry>),
}

/// Job queue shared by the gateway (producer) and workers (consumers).
///
/// A dequeued id sits on the worker's processing list until the job's
/// terminal state is written, so a state write lost to an outage can be
/// put back on the queue with [`JobQueue::recover`].
#[derive(Clone)]
pub struct JobQueue {
    backend: Arc<dyn QueueBackend>,
    processing: String,
}

impl JobQueue {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self {
            backend,
            processing: processing_key(DEFAULT_WORKER),
        }
    }

    /// Consumers sharing a backend need distinct worker ids
    pub fn with_worker(mut self, worker_id: &str) -> Self {
        self.processing = processing_key(worker_id);
        self
    }

    pub fn processing_list(&self) -> &str {
        &self.processing
    }

    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.backend
    }

    /// Fail fast with QueueUnreachable
    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    /// Record a new job and push it onto the queue; returns the job id
    pub async fn enqueue(&self, unit: &WorkUnit) -> Result<String> {
        if unit.sample_hashes.is_empty() {
            return Err(ClusterError::InvalidInput(
                "Work unit must name at least one sample".to_string(),
            ));
        }

        let job_id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(unit)?;

        // Record first so the job is never visible on the list without state
        self.backend
            .hset(
                &job_key(&job_id),
                &[
                    ("status", JobStatus::Queued.as_str().to_string()),
                    ("payload", payload),
                    ("created_at", Utc::now().to_rfc3339()),
                ],
            )
            .await?;
        self.backend.push(QUEUE_KEY, &job_id).await?;

        info!(
            "Enqueued job {} for project {} ({} samples)",
            job_id,
            unit.project_hash,
            unit.sample_hashes.len()
        );
        Ok(job_id)
    }

    /// Wait up to `timeout` for the next job. The id moves onto this
    /// worker's processing list until [`JobQueue::acknowledge`].
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<(String, WorkUnit)>> {
        let Some(job_id) = self.backend.pop_move(QUEUE_KEY, &self.processing, timeout).await? else {
            return Ok(None);
        };

        // Recovered ids whose terminal state did land need no second run
        if let Some(JobStatus::Finished | JobStatus::Failed) = self.status_if_known(&job_id).await? {
            debug!("Job {} already ended, dropping recovered id", job_id);
            self.acknowledge(&job_id).await?;
            return Ok(None);
        }

        let unit = match self.payload(&job_id).await {
            Ok(unit) => unit,
            Err(e) => {
                warn!("Dropping job {} with unreadable payload: {}", job_id, e);
                self.acknowledge(&job_id).await?;
                return Err(e);
            }
        };

        debug!("Dequeued job {} for project {}", job_id, unit.project_hash);
        Ok(Some((job_id, unit)))
    }

    /// Drop a job from this worker's processing list
    pub async fn acknowledge(&self, job_id: &str) -> Result<()> {
        self.backend.remove(&self.processing, job_id).await
    }

    /// Put every id left on this worker's processing list back on the
    /// queue; returns how many were moved
    pub async fn recover(&self) -> Result<usize> {
        let mut moved = 0;
        while let Some(job_id) = self.backend.move_tail(&self.processing, QUEUE_KEY).await? {
            info!("Requeued unfinished job {}", job_id);
            moved += 1;
        }
        Ok(moved)
    }

    async fn payload(&self, job_id: &str) -> Result<WorkUnit> {
        let payload = self
            .backend
            .hget(&job_key(job_id), "payload")
            .await?
            .ok_or_else(|| ClusterError::UnknownJob(job_id.to_string()))?;
        Ok(serde_json::from_str(&payload)?)
    }

    async fn status_if_known(&self, job_id: &str) -> Result<Option<JobStatus>> {
        match self.status(job_id).await {
            Ok(status) => Ok(Some(status)),
            Err(ClusterError::UnknownJob(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn mark_started(&self, job_id: &str) -> Result<()> {
        self.backend
            .hset(
                &job_key(job_id),
                &[
                    ("status", JobStatus::Started.as_str().to_string()),
                    ("started_at", Utc::now().to_rfc3339()),
                ],
            )
            .await
    }

    /// Store the result and flip to finished in one write
    pub async fn mark_finished(&self, job_id: &str, result: &[ClusterEntry]) -> Result<()> {
        self.backend
            .hset(
                &job_key(job_id),
                &[
                    ("result", serde_json::to_string(result)?),
                    ("status", JobStatus::Finished.as_str().to_string()),
                    ("ended_at", Utc::now().to_rfc3339()),
                ],
            )
            .await
    }

    pub async fn mark_failed(&self, job_id: &str, message: &str) -> Result<()> {
        self.backend
            .hset(
                &job_key(job_id),
                &[
                    ("error", message.to_string()),
                    ("status", JobStatus::Failed.as_str().to_string()),
                    ("ended_at", Utc::now().to_rfc3339()),
                ],
            )
            .await
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let raw = self
            .backend
            .hget(&job_key(job_id), "status")
            .await?
            .ok_or_else(|| ClusterError::UnknownJob(job_id.to_string()))?;

        JobStatus::parse(&raw)
            .ok_or_else(|| ClusterError::Queue(format!("Job {} has unrecognised status {:?}", job_id, raw)))
    }

    /// Pending until finished; a failed job reports its error
    pub async fn result(&self, job_id: &str) -> Result<JobResult> {
        match self.status(job_id).await? {
            JobStatus::Queued | JobStatus::Started => Ok(JobResult::Pending),
            JobStatus::Finished => {
                let raw = self
                    .backend
                    .hget(&job_key(job_id), "result")
                    .await?
                    .ok_or_else(|| {
                        ClusterError::Queue(format!("Job {} finished without a result", job_id))
                    })?;
                Ok(JobResult::Ready(serde_json::from_str(&raw)?))
            }
            JobStatus::Failed => {
                let message = self
                    .backend
                    .hget(&job_key(job_id), "error")
                    .await?
                    .unwrap_or_else(|| "unknown error".to_string());
                Err(ClusterError::JobFailed {
                    job_id: job_id.to_string(),
                    message,
                })
            }
        }
    }

    /// Best-effort progress message for subscribers
    pub async fn publish_progress(&self, job_id: &str, progress_pct: f32, message: &str) -> Result<()> {
        let progress_msg = serde_json::json!({
            "job_id": job_id,
            "progress_pct": progress_pct,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        });

        if let Err(e) = self
            .backend
            .publish(&progress_channel(job_id), &progress_msg.to_string())
            .await
        {
            warn!("Failed to publish progress for job {}: {}", job_id, e);
            return Err(e);
        }
        Ok(())
    }
}

/// Pub/sub channel carrying a job's progress messages
pub fn progress_channel(job_id: &str) -> String {
    format!("{}{}", PROGRESS_PREFIX, job_id)
}

fn processing_key(worker_id: &str) -> String {
    format!("{}{}", PROCESSING_PREFIX, worker_id)
}

fn job_key(job_id: &str) -> String {
    format!("{}{}", JOB_PREFIX, job_id)
}
