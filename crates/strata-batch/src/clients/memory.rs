//! In-memory client implementations for testing.
//!
//! Simple, thread-safe implementations of every client trait, backed by
//! `RwLock`-guarded maps. Each type exposes seeding and inspection helpers
//! so tests can arrange a world and assert on what the reconciler did to
//! it.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: no durability, no cross-process
//!   coordination
//! - **Single-process only**: state is lost when the process exits

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use strata_core::{ApiKind, JobKey};

use super::{
    BatchCounts, ClusterClient, JobLogStream, MetricsClient, QueueClient, SpecStore, StateStore,
    WorkerBatch, WorkerPod,
};
use crate::error::{Error, Result};
use crate::queue::{CREATED_TIMESTAMP_ATTRIBUTE, QueueMetrics, QueueUrl};
use crate::spec::BatchJobSpec;
use crate::state::{JobState, JobStatus};

/// Converts a lock poison error to a crate error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Core(strata_core::Error::internal("lock poisoned"))
}

/// In-memory job-state store.
///
/// Keeps the state record after the in-progress marker is deleted so tests
/// can still assert on the final status; only listings are driven by the
/// marker set, which matches what the reconciler observes.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: RwLock<HashMap<JobKey, JobState>>,
    markers: RwLock<HashSet<JobKey>>,
    status_writes: RwLock<Vec<(JobKey, JobStatus)>>,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a job: inserts the state record and its in-progress marker.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    pub fn insert_job(&self, state: JobState) {
        let key = state.job_key.clone();
        self.records.write().unwrap().insert(key.clone(), state);
        self.markers.write().unwrap().insert(key);
    }

    /// Seeds an in-progress marker without a state record, simulating a
    /// record the store can no longer read.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    pub fn insert_orphan_marker(&self, key: JobKey) {
        self.markers.write().unwrap().insert(key);
    }

    /// Returns the current status of a job, if its record exists.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    #[must_use]
    pub fn status_of(&self, key: &JobKey) -> Option<JobStatus> {
        self.records.read().unwrap().get(key).map(|state| state.status)
    }

    /// Returns true while the job's in-progress marker exists.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    #[must_use]
    pub fn has_marker(&self, key: &JobKey) -> bool {
        self.markers.read().unwrap().contains(key)
    }

    /// Returns every status write observed, in order.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    #[must_use]
    pub fn status_writes(&self) -> Vec<(JobKey, JobStatus)> {
        self.status_writes.read().unwrap().clone()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn list_in_progress_job_keys(&self, _kind: ApiKind) -> Result<Vec<JobKey>> {
        let markers = self.markers.read().map_err(poison_err)?;
        let mut keys: Vec<JobKey> = markers.iter().cloned().collect();
        keys.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(keys)
    }

    async fn get_job_state(&self, key: &JobKey) -> Result<JobState> {
        self.records
            .read()
            .map_err(poison_err)?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::state_store(format!("no state record for job {key}")))
    }

    async fn set_status(&self, key: &JobKey, status: JobStatus) -> Result<()> {
        let mut records = self.records.write().map_err(poison_err)?;
        let state = records
            .get_mut(key)
            .ok_or_else(|| Error::state_store(format!("no state record for job {key}")))?;
        state.status = status;
        state
            .last_updated
            .insert(status.as_str().to_string(), Utc::now());
        drop(records);

        self.status_writes
            .write()
            .map_err(poison_err)?
            .push((key.clone(), status));
        Ok(())
    }

    async fn delete_in_progress_marker(&self, key: &JobKey) -> Result<()> {
        self.markers.write().map_err(poison_err)?.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct QueueEntry {
    attributes: HashMap<String, String>,
    metrics: QueueMetrics,
}

/// In-memory queue service.
#[derive(Debug, Default)]
pub struct InMemoryQueueClient {
    queues: RwLock<HashMap<QueueUrl, QueueEntry>>,
    deleted: RwLock<Vec<QueueUrl>>,
}

impl InMemoryQueueClient {
    /// Creates an empty queue service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue with the given creation time and empty metrics.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    pub fn insert_queue(&self, url: QueueUrl, created_at: DateTime<Utc>) {
        let mut attributes = HashMap::new();
        attributes.insert(
            CREATED_TIMESTAMP_ATTRIBUTE.to_string(),
            created_at.timestamp().to_string(),
        );
        self.queues.write().unwrap().insert(
            url,
            QueueEntry {
                attributes,
                metrics: QueueMetrics::default(),
            },
        );
    }

    /// Overwrites a queue's message-depth metrics.
    ///
    /// # Panics
    ///
    /// Panics if the queue does not exist or the lock is poisoned.
    pub fn set_metrics(&self, url: &QueueUrl, metrics: QueueMetrics) {
        self.queues
            .write()
            .unwrap()
            .get_mut(url)
            .expect("queue must exist")
            .metrics = metrics;
    }

    /// Returns true while the queue exists.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    #[must_use]
    pub fn contains(&self, url: &QueueUrl) -> bool {
        self.queues.read().unwrap().contains_key(url)
    }

    /// Returns every queue deletion observed, in order.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    #[must_use]
    pub fn deleted_queues(&self) -> Vec<QueueUrl> {
        self.deleted.read().unwrap().clone()
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn list_queue_urls(&self) -> Result<Vec<QueueUrl>> {
        let queues = self.queues.read().map_err(poison_err)?;
        let mut urls: Vec<QueueUrl> = queues.keys().cloned().collect();
        urls.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(urls)
    }

    async fn queue_attributes(&self, url: &QueueUrl) -> Result<HashMap<String, String>> {
        self.queues
            .read()
            .map_err(poison_err)?
            .get(url)
            .map(|entry| entry.attributes.clone())
            .ok_or_else(|| Error::queue(format!("queue {url} does not exist")))
    }

    async fn queue_metrics(&self, url: &QueueUrl) -> Result<QueueMetrics> {
        self.queues
            .read()
            .map_err(poison_err)?
            .get(url)
            .map(|entry| entry.metrics)
            .ok_or_else(|| Error::queue(format!("queue {url} does not exist")))
    }

    async fn delete_queue(&self, url: &QueueUrl) -> Result<()> {
        self.queues.write().map_err(poison_err)?.remove(url);
        self.deleted.write().map_err(poison_err)?.push(url.clone());
        Ok(())
    }
}

/// In-memory cluster orchestrator.
#[derive(Debug, Default)]
pub struct InMemoryClusterClient {
    batches: RwLock<HashMap<String, WorkerBatch>>,
    pods: RwLock<HashMap<String, Vec<WorkerPod>>>,
    deleted: RwLock<Vec<JobKey>>,
}

impl InMemoryClusterClient {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a worker batch, keyed by its `jobID` label.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    pub fn insert_batch(&self, batch: WorkerBatch) {
        self.batches
            .write()
            .unwrap()
            .insert(batch.job_id.clone(), batch);
    }

    /// Registers the worker pods for a job ID.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    pub fn insert_pods(&self, job_id: impl Into<String>, pods: Vec<WorkerPod>) {
        self.pods.write().unwrap().insert(job_id.into(), pods);
    }

    /// Returns true while the job's worker batch exists.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    #[must_use]
    pub fn contains_batch(&self, job_id: &str) -> bool {
        self.batches.read().unwrap().contains_key(job_id)
    }

    /// Returns every worker-batch deletion observed, in order.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    #[must_use]
    pub fn deleted_batches(&self) -> Vec<JobKey> {
        self.deleted.read().unwrap().clone()
    }
}

#[async_trait]
impl ClusterClient for InMemoryClusterClient {
    async fn list_worker_batches(&self, _kind: ApiKind) -> Result<Vec<WorkerBatch>> {
        let batches = self.batches.read().map_err(poison_err)?;
        let mut listed: Vec<WorkerBatch> = batches.values().cloned().collect();
        listed.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        Ok(listed)
    }

    async fn list_worker_pods(&self, job_id: &str) -> Result<Vec<WorkerPod>> {
        Ok(self
            .pods
            .read()
            .map_err(poison_err)?
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_worker_batch(&self, key: &JobKey) -> Result<()> {
        self.batches.write().map_err(poison_err)?.remove(&key.id);
        self.deleted.write().map_err(poison_err)?.push(key.clone());
        Ok(())
    }
}

/// In-memory spec store.
#[derive(Debug, Default)]
pub struct InMemorySpecStore {
    specs: RwLock<HashMap<String, BatchJobSpec>>,
    downloads: RwLock<Vec<String>>,
}

impl InMemorySpecStore {
    /// Creates an empty spec store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the spec for a job ID.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    pub fn insert_spec(&self, job_id: impl Into<String>, spec: BatchJobSpec) {
        self.specs.write().unwrap().insert(job_id.into(), spec);
    }

    /// Returns the job IDs of every download served, in order.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    #[must_use]
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.read().unwrap().clone()
    }
}

#[async_trait]
impl SpecStore for InMemorySpecStore {
    async fn download_spec(&self, key: &JobKey) -> Result<BatchJobSpec> {
        self.downloads
            .write()
            .map_err(poison_err)?
            .push(key.id.clone());
        self.specs
            .read()
            .map_err(poison_err)?
            .get(&key.id)
            .cloned()
            .ok_or_else(|| Error::spec_store(format!("no spec object for job {key}")))
    }
}

/// In-memory batch-count metrics backend.
///
/// Unknown jobs report zero counts, mirroring a metrics backend that has
/// not ingested any data points yet.
#[derive(Debug, Default)]
pub struct InMemoryMetricsClient {
    counts: RwLock<HashMap<String, BatchCounts>>,
}

impl InMemoryMetricsClient {
    /// Creates an empty metrics backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the succeeded work-item count for a job ID.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    pub fn set_succeeded_count(&self, job_id: impl Into<String>, succeeded: u64) {
        self.counts
            .write()
            .unwrap()
            .insert(job_id.into(), BatchCounts { succeeded });
    }
}

#[async_trait]
impl MetricsClient for InMemoryMetricsClient {
    async fn batch_counts(&self, key: &JobKey) -> Result<BatchCounts> {
        Ok(self
            .counts
            .read()
            .map_err(poison_err)?
            .get(&key.id)
            .copied()
            .unwrap_or_default())
    }
}

/// In-memory user-visible log stream.
#[derive(Debug, Default)]
pub struct InMemoryJobLogStream {
    lines: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryJobLogStream {
    /// Creates an empty log stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lines appended for a job, in order.
    ///
    /// # Panics
    ///
    /// Panics if the backing lock is poisoned.
    #[must_use]
    pub fn lines_for(&self, key: &JobKey) -> Vec<String> {
        self.lines
            .read()
            .unwrap()
            .get(&key.id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobLogStream for InMemoryJobLogStream {
    async fn append(&self, key: &JobKey, message: &str) -> Result<()> {
        self.lines
            .write()
            .map_err(poison_err)?
            .entry(key.id.clone())
            .or_default()
            .push(message.to_string());
        Ok(())
    }
}
