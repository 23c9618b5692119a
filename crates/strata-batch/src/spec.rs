//! The immutable user-provided job plan.
//!
//! A `BatchJobSpec` is written to object storage by the submission surface
//! and never mutated afterwards. The reconciler fetches it on demand and
//! caches it in-process for the job's in-progress lifetime.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The immutable plan for one batch job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobSpec {
    /// Expected worker count.
    pub workers: u32,
    /// Total number of work items enqueued for the job.
    pub total_batch_count: u64,
    /// Optional job timeout in seconds, measured from `start_time`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Wall-clock time at which the job started.
    pub start_time: DateTime<Utc>,
}

impl BatchJobSpec {
    /// Returns true when the job has a timeout and `now` is past it.
    #[must_use]
    pub fn timed_out_at(&self, now: DateTime<Utc>) -> bool {
        self.timeout_secs.is_some_and(|secs| {
            let limit = Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX));
            now - self.start_time > limit
        })
    }
}
