//! Failure investigation for jobs whose worker batch reports failures.
//!
//! When the orchestrator counts any failed worker, the investigator
//! inspects the job's pods to assign a specific failure reason: a memory
//! kill anywhere classifies the job `WorkerOom`; otherwise every recorded
//! container termination becomes one user-visible log line and the job
//! classifies `WorkerError`.

use strata_core::JobKey;

use crate::error::{Result, first_error};
use crate::state::JobStatus;

use super::Reconciler;

impl Reconciler {
    /// Assigns a failure reason to a job with at least one failed worker.
    pub(super) async fn investigate_failure(&mut self, key: &JobKey) -> Result<()> {
        // Pod listing is best-effort: an empty list still produces a
        // classification, just without per-container detail.
        let pods = self
            .clients
            .cluster
            .list_worker_pods(&key.id)
            .await
            .unwrap_or_default();

        let mut reason_found = false;
        for pod in &pods {
            if pod.was_oom_killed() {
                return self
                    .persist_terminal(
                        key,
                        JobStatus::WorkerOom,
                        "at least one worker was killed because it ran out of memory",
                    )
                    .await;
            }

            for container in &pod.containers {
                if let Some(termination) = container.reported_termination() {
                    let _ = self
                        .clients
                        .log_stream
                        .append(
                            key,
                            &format!(
                                "at least one worker had status {} and terminated for reason {} (exit_code={})",
                                pod.status,
                                termination.reason.to_lowercase(),
                                termination.exit_code
                            ),
                        )
                        .await;
                    reason_found = true;
                }
            }
        }

        if !reason_found {
            return self
                .persist_terminal(
                    key,
                    JobStatus::WorkerError,
                    "workers were killed for unknown reason",
                )
                .await;
        }

        // The per-container lines above are the explanation.
        let status_write = self.clients.state_store.set_worker_error(key).await;
        let teardown = self.delete_runtime_resources(key).await;
        let result = first_error([status_write, teardown]);
        if result.is_ok() {
            self.metrics
                .record_terminal_transition(JobStatus::WorkerError.as_str());
        }
        result
    }
}
