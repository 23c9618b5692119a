//! Completion classification for jobs in the running status.
//!
//! A running job has truly finished only when three systems agree: the
//! queue is empty, every worker exited cleanly, and the per-job batch
//! metrics account for every work item. Each of those signals is
//! eventually consistent, so a single observation is never trusted: the
//! deferred-delete set implements a "confirm on the next tick" protocol
//! that converts eventual consistency into a bounded-time decision. Any
//! disagreement that survives two cycles resolves to `UnexpectedError`
//! rather than a false success.

use strata_core::JobKey;

use crate::clients::WorkerBatch;
use crate::error::Result;
use crate::queue::QueueUrl;
use crate::state::JobStatus;

use super::Reconciler;

impl Reconciler {
    /// Decides whether a running job has finished, deferring one cycle
    /// where cross-system metric skew could otherwise produce a wrong
    /// terminal classification.
    pub(super) async fn check_completion(
        &mut self,
        key: &JobKey,
        queue_url: &QueueUrl,
        batch: &WorkerBatch,
    ) -> Result<()> {
        if batch.failed > 0 {
            return self.investigate_failure(key).await;
        }

        let depth = self.clients.queues.queue_metrics(queue_url).await?;

        if !depth.is_empty() {
            if batch.active == 0 {
                if self.deferred_delete.remove(&key.id) {
                    // The disagreement held across two cycles.
                    return self
                        .persist_terminal(
                            key,
                            JobStatus::UnexpectedError,
                            "unexpected job status because cluster state indicates job has \
                             completed but metrics indicate that job is still in progress",
                        )
                        .await;
                }
                // Give the queue metrics one cycle to catch up.
                self.deferred_delete.insert(key.id.clone());
            }
            return Ok(());
        }

        let counts = self.clients.batch_metrics.batch_counts(key).await?;
        let spec = self.clients.specs.download_spec(key).await?;

        if spec.workers == batch.succeeded {
            if counts.succeeded == spec.total_batch_count {
                // Commit only when the agreement has held across two
                // cycles; the first empty-queue observation defers.
                if self.deferred_delete.remove(&key.id) {
                    return self
                        .persist_terminal(key, JobStatus::Succeeded, "job completed successfully")
                        .await;
                }
            } else if self.deferred_delete.remove(&key.id) {
                // The success metrics may still be catching up; commit to
                // completed-with-failures only on the second observation.
                return self
                    .persist_terminal(
                        key,
                        JobStatus::CompletedWithFailures,
                        "job completed with failures; some batches did not succeed",
                    )
                    .await;
            }
        } else if self.deferred_delete.remove(&key.id) {
            return self
                .persist_terminal(
                    key,
                    JobStatus::UnexpectedError,
                    "unexpected job state; queue is empty but cluster state still indicates \
                     that the job is still in progress",
                )
                .await;
        }

        // Workers take at least 20 seconds to exit after observing an
        // empty queue, and both queue metrics and batch metrics lag by a
        // few seconds. Wait one more cycle before deciding.
        self.deferred_delete.insert(key.id.clone());

        Ok(())
    }
}
