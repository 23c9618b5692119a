//! The batch-job reconciler.
//!
//! On a fixed cadence the reconciler gathers three independent views of
//! the world — in-progress job keys from the state store, work queues from
//! the queue service, and worker batches from the cluster orchestrator —
//! joins them by job ID, and for each job decides one of: advance status,
//! defer a delete decision one cycle, finalize a terminal status, or
//! garbage-collect.
//!
//! ## Pass structure
//!
//! 1. Load the three world-views (each under a call deadline)
//! 2. Evict cached specs for jobs no longer in progress
//! 3. Reconcile every in-progress job (errors are per-job; the pass
//!    continues)
//! 4. Delete worker batches whose job is not in progress
//! 5. Delete queues with no batch and no in-progress job, subject to the
//!    queue-creation grace period
//! 6. Prune the deferred-delete set to in-progress jobs
//!
//! No two passes run concurrently: the pass loop awaits each pass before
//! the next tick, and an overrun delays the following tick. The spec cache
//! and the deferred-delete set are therefore plain fields with no locking.

mod completion;
mod failure;
pub mod verify;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::Instrument as _;

use strata_core::{ApiKind, JobKey, observability::job_span};

use crate::clients::{
    ClusterClient, JobLogStream, MetricsClient, QueueClient, SpecStore, StateStore, WorkerBatch,
};
use crate::config::ReconcilerConfig;
use crate::error::{Error, Result, first_error};
use crate::metrics::{ReconcilerMetrics, time_reconcile_pass};
use crate::queue::{QueueUrl, created_timestamp, expected_queue_url};
use crate::spec::BatchJobSpec;
use crate::state::JobStatus;

/// Handles to the external systems the reconciler observes and mutates.
#[derive(Clone)]
pub struct Clients {
    /// The durable job-state store.
    pub state_store: Arc<dyn StateStore>,
    /// The managed work-queue service.
    pub queues: Arc<dyn QueueClient>,
    /// The container orchestrator.
    pub cluster: Arc<dyn ClusterClient>,
    /// Object storage holding immutable job specs.
    pub specs: Arc<dyn SpecStore>,
    /// The per-job batch-count metrics backend.
    pub batch_metrics: Arc<dyn MetricsClient>,
    /// The user-visible per-job log stream.
    pub log_stream: Arc<dyn JobLogStream>,
}

/// The batch-job reconciler.
///
/// Owns the pass cadence and the two pieces of pass-scoped in-process
/// state: the job-spec cache and the deferred-delete set. Mutation is
/// confined to the single pass task; external mutual exclusion (leader
/// election) is assumed at the process level.
pub struct Reconciler {
    config: ReconcilerConfig,
    clients: Clients,
    metrics: ReconcilerMetrics,
    /// Specs cached for the job's in-progress lifetime, keyed by job ID.
    spec_cache: HashMap<String, BatchJobSpec>,
    /// Job IDs waiting one more cycle before a delete decision commits.
    deferred_delete: HashSet<String>,
}

impl Reconciler {
    /// Creates a reconciler over the given clients.
    #[must_use]
    pub fn new(config: ReconcilerConfig, clients: Clients) -> Self {
        Self {
            config,
            clients,
            metrics: ReconcilerMetrics::new(),
            spec_cache: HashMap::new(),
            deferred_delete: HashSet::new(),
        }
    }

    /// Drives reconciliation passes forever at the configured period.
    ///
    /// The first pass runs immediately. A pass that overruns the period
    /// delays the next tick rather than stacking a concurrent pass.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.reconcile_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.reconcile_once().await {
                Ok(()) => self.metrics.record_pass("ok"),
                Err(err) => {
                    self.metrics.record_pass("error");
                    tracing::error!(error = %err, "reconciliation pass failed");
                }
            }
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// Per-job errors are reported and skipped; only collection-level
    /// failures (listing a world-view) abort the pass.
    ///
    /// # Errors
    ///
    /// Returns an error when one of the three world-views cannot be
    /// listed.
    pub async fn reconcile_once(&mut self) -> Result<()> {
        let _timer = time_reconcile_pass();
        let now = Utc::now();

        let in_progress = self
            .with_deadline(
                "list_in_progress_job_keys",
                self.clients.state_store.list_in_progress_job_keys(ApiKind::Batch),
            )
            .await?;
        let in_progress_ids: HashSet<String> =
            in_progress.iter().map(|key| key.id.clone()).collect();
        self.metrics.set_in_progress_jobs(in_progress.len());

        // Completed jobs leave the cache here.
        self.spec_cache.retain(|id, _| in_progress_ids.contains(id));

        let queue_urls = self
            .with_deadline("list_queue_urls", self.clients.queues.list_queue_urls())
            .await?;
        let queues: HashMap<String, QueueUrl> = queue_urls
            .into_iter()
            .map(|url| (url.job_key().id, url))
            .collect();

        let batch_list = self
            .with_deadline(
                "list_worker_batches",
                self.clients.cluster.list_worker_batches(ApiKind::Batch),
            )
            .await?;
        let batches: HashMap<String, WorkerBatch> = batch_list
            .into_iter()
            .map(|batch| (batch.job_id.clone(), batch))
            .collect();

        for key in &in_progress {
            let result = self
                .reconcile_job(key, queues.get(&key.id), batches.get(&key.id), now)
                .instrument(job_span("reconcile", &key.api_name, &key.id))
                .await;
            if let Err(err) = result {
                self.report_job_error(key, &err);
            }
        }

        // Worker batch exists but the job is not in progress.
        for (job_id, batch) in &batches {
            if in_progress_ids.contains(job_id) {
                continue;
            }
            let key = batch.job_key();
            if let Err(err) = self.delete_runtime_resources(&key).await {
                self.report_job_error(&key, &err);
            }
        }

        // Queue exists but there is no worker batch and no in-progress job
        // (queue plus batch without an in-progress job is handled above).
        for (job_id, url) in &queues {
            if in_progress_ids.contains(job_id) || batches.contains_key(job_id) {
                continue;
            }

            let key = url.job_key();
            let attributes = match self.clients.queues.queue_attributes(url).await {
                Ok(attributes) => attributes,
                Err(err) => {
                    self.report_job_error(&key, &err);
                    HashMap::new()
                }
            };

            // The queue may have been created moments before its
            // in-progress marker was written.
            if now - created_timestamp(&attributes) <= self.config.queue_exist_grace_period {
                continue;
            }

            if let Err(err) = self.delete_runtime_resources(&key).await {
                self.report_job_error(&key, &err);
            }
        }

        self.deferred_delete.retain(|id| in_progress_ids.contains(id));
        self.metrics.set_deferred_jobs(self.deferred_delete.len());

        Ok(())
    }

    /// Reconciles a single in-progress job.
    async fn reconcile_job(
        &mut self,
        key: &JobKey,
        queue_url: Option<&QueueUrl>,
        batch: Option<&WorkerBatch>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let state = match self.clients.state_store.get_job_state(key).await {
            Ok(state) => state,
            Err(err) => {
                let _ = self
                    .clients
                    .log_stream
                    .append(
                        key,
                        &format!("{err}; terminating job and cleaning up job resources"),
                    )
                    .await;
                return first_error([
                    self.clients.state_store.delete_in_progress_marker(key).await,
                    self.delete_runtime_resources(key).await,
                ]);
            }
        };

        if state.status.is_terminal() {
            // A prior pass crashed between persisting the terminal status
            // and finishing cleanup; finish it best-effort.
            let _ = self.clients.state_store.delete_in_progress_marker(key).await;
            let _ = self.delete_runtime_resources(key).await;
            return Ok(());
        }

        if let Some((status, message)) =
            verify::verify_consistency(&state, queue_url, batch, now, &self.config)
        {
            return self.persist_terminal(key, status, &message).await;
        }

        let Some(queue_url) = queue_url else {
            // Queue listings are eventually consistent; the verifier's
            // grace window is still open.
            return Ok(());
        };

        let spec = match self.spec_cache.get(&key.id) {
            Some(spec) => spec.clone(),
            None => match self.clients.specs.download_spec(key).await {
                Ok(spec) => {
                    self.spec_cache.insert(key.id.clone(), spec.clone());
                    spec
                }
                Err(err) => {
                    let _ = self
                        .clients
                        .log_stream
                        .append(
                            key,
                            &format!("{err}; terminating job and cleaning up job resources"),
                        )
                        .await;
                    return first_error([
                        self.clients.state_store.delete_in_progress_marker(key).await,
                        self.delete_runtime_resources(key).await,
                    ]);
                }
            },
        };

        if spec.timed_out_at(now) {
            let timeout_secs = spec.timeout_secs.unwrap_or_default();
            return self
                .persist_terminal(
                    key,
                    JobStatus::TimedOut,
                    &format!(
                        "terminating job after exceeding the specified timeout of {timeout_secs} seconds"
                    ),
                )
                .await;
        }

        if state.status == JobStatus::Running {
            if let Some(batch) = batch {
                return self.check_completion(key, queue_url, batch).await;
            }
        }

        Ok(())
    }

    /// Finalizes a job: explanatory line first, then the terminal status,
    /// then runtime teardown, attempting every effect.
    async fn persist_terminal(
        &self,
        key: &JobKey,
        status: JobStatus,
        message: &str,
    ) -> Result<()> {
        let log_write = self.clients.log_stream.append(key, message).await;
        let status_write = match status {
            JobStatus::Succeeded => self.clients.state_store.set_succeeded(key).await,
            JobStatus::CompletedWithFailures => {
                self.clients.state_store.set_completed_with_failures(key).await
            }
            JobStatus::TimedOut => self.clients.state_store.set_timed_out(key).await,
            JobStatus::UnexpectedError => {
                self.clients.state_store.set_unexpected_error(key).await
            }
            JobStatus::WorkerOom => self.clients.state_store.set_worker_oom(key).await,
            JobStatus::WorkerError => self.clients.state_store.set_worker_error(key).await,
            other => self.clients.state_store.set_status(key, other).await,
        };
        let teardown = self.delete_runtime_resources(key).await;

        let result = first_error([log_write, status_write, teardown]);
        if result.is_ok() {
            self.metrics.record_terminal_transition(status.as_str());
        }
        result
    }

    /// Deletes the job's worker batch and queue. Both deletes are
    /// idempotent and both are attempted even when the first fails.
    async fn delete_runtime_resources(&self, key: &JobKey) -> Result<()> {
        let url = expected_queue_url(&self.config.queue_url_base, key);

        let batch_delete = self.clients.cluster.delete_worker_batch(key).await;
        if batch_delete.is_ok() {
            self.metrics.record_runtime_deletion("worker_batch");
        }

        let queue_delete = self.clients.queues.delete_queue(&url).await;
        if queue_delete.is_ok() {
            self.metrics.record_runtime_deletion("queue");
        }

        first_error([batch_delete, queue_delete])
    }

    /// Reports a per-job error without aborting the pass.
    fn report_job_error(&self, key: &JobKey, err: &Error) {
        self.metrics.record_job_error(err.stage());
        tracing::error!(job = %key, error = %err, "failed to reconcile job");
    }

    async fn with_deadline<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.config.external_call_timeout, fut)
            .await
            .map_err(|_| Error::timeout(operation))?
    }

    /// Returns true while the job ID is in the deferred-delete set.
    ///
    /// Exposed for tests asserting the two-cycle confirmation protocol.
    #[must_use]
    pub fn is_deferred(&self, job_id: &str) -> bool {
        self.deferred_delete.contains(job_id)
    }

    /// Returns true while a spec is cached for the job ID.
    ///
    /// Exposed for tests asserting cache eviction.
    #[must_use]
    pub fn has_cached_spec(&self, job_id: &str) -> bool {
        self.spec_cache.contains_key(job_id)
    }
}
