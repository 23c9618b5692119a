//! Client abstractions for the external systems the reconciler observes.
//!
//! This module provides:
//!
//! - [`StateStore`]: the platform's durable job-state store
//! - [`QueueClient`]: the managed work-queue service
//! - [`ClusterClient`]: the container orchestrator
//! - [`SpecStore`]: object storage holding immutable job specs
//! - [`MetricsClient`]: the per-job batch-count metrics backend
//! - [`JobLogStream`]: the user-visible per-job log stream
//!
//! ## Design Principles
//!
//! - **Backend agnostic**: the reconciler never names a concrete vendor;
//!   the same loop runs against any conforming backend
//! - **Eventual consistency is the caller's problem**: listings and
//!   metrics may lag reality; the reconciler absorbs the skew with grace
//!   windows, not the clients
//! - **Idempotent teardown**: both delete operations succeed when the
//!   resource is already gone

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use strata_core::{ApiKind, JobKey};

use crate::error::Result;
use crate::queue::{QueueMetrics, QueueUrl};
use crate::spec::BatchJobSpec;
use crate::state::{JobState, JobStatus};

/// Pod exit code the kernel OOM killer produces.
const OOM_EXIT_CODE: i32 = 137;

/// Termination reason the orchestrator records for memory kills.
const OOM_REASON: &str = "OOMKilled";

/// One worker batch as listed by the cluster orchestrator.
///
/// Carries the identity labels the platform stamped at creation plus the
/// orchestrator's worker counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerBatch {
    /// `apiName` label.
    pub api_name: String,
    /// `jobID` label.
    pub job_id: String,
    /// Workers currently running.
    pub active: u32,
    /// Workers that exited cleanly.
    pub succeeded: u32,
    /// Workers that terminated abnormally.
    pub failed: u32,
}

impl WorkerBatch {
    /// Returns the job key reconstructed from the batch labels.
    #[must_use]
    pub fn job_key(&self) -> JobKey {
        JobKey::new(self.api_name.clone(), self.job_id.clone())
    }
}

/// Recorded termination of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerTermination {
    /// Process exit code.
    pub exit_code: i32,
    /// Orchestrator-assigned reason string (e.g. `Error`, `OOMKilled`).
    pub reason: String,
}

impl ContainerTermination {
    /// Returns true when this termination was a memory kill.
    #[must_use]
    pub fn is_oom(&self) -> bool {
        self.reason == OOM_REASON || self.exit_code == OOM_EXIT_CODE
    }
}

/// Per-container state of one worker pod.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerContainer {
    /// Termination recorded before the most recent restart, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_termination: Option<ContainerTermination>,
    /// Termination of the current container state, if terminated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<ContainerTermination>,
}

impl WorkerContainer {
    /// Returns the termination to report for this container.
    ///
    /// The pre-restart termination is inspected first; the current state
    /// is used only when no restart has happened.
    #[must_use]
    pub fn reported_termination(&self) -> Option<&ContainerTermination> {
        self.last_termination.as_ref().or(self.termination.as_ref())
    }
}

/// One worker pod as listed by the cluster orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPod {
    /// Pod name.
    pub name: String,
    /// Pod-level status phrase shown to users (e.g. `failed`).
    pub status: String,
    /// Per-container states.
    pub containers: Vec<WorkerContainer>,
}

impl WorkerPod {
    /// Returns true when any container on this pod was memory-killed.
    #[must_use]
    pub fn was_oom_killed(&self) -> bool {
        self.containers.iter().any(|container| {
            container
                .last_termination
                .as_ref()
                .is_some_and(ContainerTermination::is_oom)
                || container
                    .termination
                    .as_ref()
                    .is_some_and(ContainerTermination::is_oom)
        })
    }
}

/// Aggregate work-item counts for one job.
///
/// Eventually consistent; lags the true counts by seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCounts {
    /// Work items that completed successfully.
    pub succeeded: u64,
}

/// The platform's durable job-state store.
///
/// ## Status timestamps
///
/// Implementations must stamp `last_updated[status]` whenever a status is
/// written, so callers can never persist a status without its timestamp.
/// `list_in_progress_job_keys` is driven by per-job in-progress markers;
/// deleting the marker removes the job from all future listings and
/// destroys the state record.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Lists the keys of every job the platform still owns, filtered to
    /// one API kind.
    async fn list_in_progress_job_keys(&self, kind: ApiKind) -> Result<Vec<JobKey>>;

    /// Fetches the durable state record for a job.
    async fn get_job_state(&self, key: &JobKey) -> Result<JobState>;

    /// Persists a new status, stamping `last_updated[status]`.
    async fn set_status(&self, key: &JobKey, status: JobStatus) -> Result<()>;

    /// Deletes the job's in-progress marker. Idempotent.
    async fn delete_in_progress_marker(&self, key: &JobKey) -> Result<()>;

    /// Persists the `Succeeded` terminal status.
    async fn set_succeeded(&self, key: &JobKey) -> Result<()> {
        self.set_status(key, JobStatus::Succeeded).await
    }

    /// Persists the `CompletedWithFailures` terminal status.
    async fn set_completed_with_failures(&self, key: &JobKey) -> Result<()> {
        self.set_status(key, JobStatus::CompletedWithFailures).await
    }

    /// Persists the `TimedOut` terminal status.
    async fn set_timed_out(&self, key: &JobKey) -> Result<()> {
        self.set_status(key, JobStatus::TimedOut).await
    }

    /// Persists the `UnexpectedError` terminal status.
    async fn set_unexpected_error(&self, key: &JobKey) -> Result<()> {
        self.set_status(key, JobStatus::UnexpectedError).await
    }

    /// Persists the `WorkerOom` terminal status.
    async fn set_worker_oom(&self, key: &JobKey) -> Result<()> {
        self.set_status(key, JobStatus::WorkerOom).await
    }

    /// Persists the `WorkerError` terminal status.
    async fn set_worker_error(&self, key: &JobKey) -> Result<()> {
        self.set_status(key, JobStatus::WorkerError).await
    }
}

/// The managed work-queue service.
///
/// Queue listings and metrics are eventually consistent.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Lists the URLs of every queue the platform has created, across all
    /// APIs.
    async fn list_queue_urls(&self) -> Result<Vec<QueueUrl>>;

    /// Fetches a queue's attribute map. Must expose
    /// [`crate::queue::CREATED_TIMESTAMP_ATTRIBUTE`] as epoch seconds.
    async fn queue_attributes(&self, url: &QueueUrl) -> Result<HashMap<String, String>>;

    /// Fetches a queue's live message-depth metrics.
    async fn queue_metrics(&self, url: &QueueUrl) -> Result<QueueMetrics>;

    /// Deletes a queue. Idempotent.
    async fn delete_queue(&self, url: &QueueUrl) -> Result<()>;
}

/// The container orchestrator managing worker batches.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Lists worker batches labelled with the given API kind.
    async fn list_worker_batches(&self, kind: ApiKind) -> Result<Vec<WorkerBatch>>;

    /// Lists the worker pods labelled with the given job ID.
    async fn list_worker_pods(&self, job_id: &str) -> Result<Vec<WorkerPod>>;

    /// Deletes a job's worker batch. Idempotent.
    async fn delete_worker_batch(&self, key: &JobKey) -> Result<()>;
}

/// Object storage holding immutable job specs.
#[async_trait]
pub trait SpecStore: Send + Sync {
    /// Downloads the job spec for a job.
    async fn download_spec(&self, key: &JobKey) -> Result<BatchJobSpec>;
}

/// The per-job batch-count metrics backend.
#[async_trait]
pub trait MetricsClient: Send + Sync {
    /// Fetches the current aggregate work-item counts for a job.
    async fn batch_counts(&self, key: &JobKey) -> Result<BatchCounts>;
}

/// The user-visible per-job log stream.
///
/// Appends are best-effort; callers fold write errors into the same
/// first-error aggregation as the surrounding state mutation.
#[async_trait]
pub trait JobLogStream: Send + Sync {
    /// Appends one human-readable line to the job's stream.
    async fn append(&self, key: &JobKey, message: &str) -> Result<()>;
}
