//! State-consistency verification for in-progress jobs.
//!
//! Given one job's stored state plus the observed queue and worker-batch
//! handles, decides whether the views are consistent. Grace windows absorb
//! the delay between when the platform decides to create a queue or batch
//! and when the respective external API lists it, suppressing false
//! positives from eventual consistency.

use chrono::{DateTime, Utc};

use crate::clients::WorkerBatch;
use crate::config::ReconcilerConfig;
use crate::queue::{QueueUrl, expected_queue_url};
use crate::state::{JobState, JobStatus, LIVENESS_PHASE};

/// Checks one job's stored state against the observed queue and worker
/// batch.
///
/// Returns `None` when the views are consistent (or any inconsistency is
/// still within its grace window), or the terminal status to persist along
/// with the user-visible explanation.
///
/// Rules are evaluated in order; the first match wins.
#[must_use]
pub fn verify_consistency(
    state: &JobState,
    queue_url: Option<&QueueUrl>,
    batch: Option<&WorkerBatch>,
    now: DateTime<Utc>,
    config: &ReconcilerConfig,
) -> Option<(JobStatus, String)> {
    let key = &state.job_key;

    if queue_url.is_none() {
        // A newly created queue may take a while to appear in listings.
        if state.age_of(JobStatus::Enqueuing.as_str(), now) <= config.queue_exist_grace_period {
            return None;
        }

        let expected = expected_queue_url(&config.queue_url_base, key);
        return Some((
            JobStatus::UnexpectedError,
            format!(
                "terminating job {}; queue with url {} was not found",
                key.user_string(),
                expected
            ),
        ));
    }

    if state.status == JobStatus::Enqueuing
        && state.age_of(LIVENESS_PHASE, now)
            >= config.enqueuing_liveness_period + config.enqueuing_liveness_buffer
    {
        return Some((
            JobStatus::EnqueueFailed,
            format!(
                "terminating job {}; enqueuing liveness check failed",
                key.user_string()
            ),
        ));
    }

    if state.status == JobStatus::Running {
        // A newly created batch may take a while to appear in listings.
        if state.age_of(JobStatus::Running.as_str(), now)
            <= config.worker_batch_exist_grace_period
        {
            return None;
        }

        if batch.is_none() {
            return Some((
                JobStatus::UnexpectedError,
                format!(
                    "terminating job {}; unable to find the job's worker batch",
                    key.user_string()
                ),
            ));
        }
    }

    None
}
