//! Job lifecycle state machine and the durable job-state record.
//!
//! This module provides:
//! - `JobStatus`: the state machine a job moves through
//! - `JobState`: the durable record of one job's lifecycle
//! - `LIVENESS_PHASE`: the `last_updated` key stamped by the enqueuer's
//!   liveness heartbeat
//!
//! Typical progression is `Enqueuing -> Running -> {Succeeded |
//! CompletedWithFailures}`. Any state may transition to `TimedOut`,
//! `UnexpectedError`, `WorkerOom`, or `WorkerError` when the reconciler
//! detects the corresponding condition.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use strata_core::JobKey;

/// `last_updated` key stamped each time the enqueuing process proves it is
/// still alive. The state-consistency verifier declares enqueue failure
/// when this stamp goes stale past the liveness period plus buffer.
pub const LIVENESS_PHASE: &str = "enqueuing_liveness";

/// Lifecycle status of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Work items are being written to the job's queue.
    Enqueuing,
    /// Workers are consuming the queue.
    Running,
    /// Every worker exited cleanly and every work item succeeded.
    Succeeded,
    /// Workers exited cleanly but some work items did not succeed.
    CompletedWithFailures,
    /// The job exceeded its user-specified timeout.
    TimedOut,
    /// The enqueuing process stopped reporting liveness.
    EnqueueFailed,
    /// At least one worker was killed for exceeding its memory limit.
    WorkerOom,
    /// At least one worker terminated abnormally.
    WorkerError,
    /// The three views of the world disagreed in a way that cannot be
    /// attributed to eventual consistency.
    UnexpectedError,
}

impl JobStatus {
    /// Returns the canonical string form, used as the `last_updated` key
    /// and in metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enqueuing => "enqueuing",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::CompletedWithFailures => "completed_with_failures",
            Self::TimedOut => "timed_out",
            Self::EnqueueFailed => "enqueue_failed",
            Self::WorkerOom => "worker_oom",
            Self::WorkerError => "worker_error",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    /// Returns true while the platform still owes the job progress.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::Enqueuing | Self::Running)
    }

    /// Returns true for statuses from which no further transition is
    /// permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_in_progress()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable record of a job's lifecycle.
///
/// Created at submission, mutated only by the reconciler afterwards, and
/// destroyed when the job's in-progress marker is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    /// Identity of the job.
    pub job_key: JobKey,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Wall-clock timestamp at which each status or phase name was last
    /// observed. Monotonic per name within a single job lifetime.
    pub last_updated: HashMap<String, DateTime<Utc>>,
}

impl JobState {
    /// Creates a new record in the given status, stamping `last_updated`
    /// for that status at `now`.
    #[must_use]
    pub fn new(job_key: JobKey, status: JobStatus, now: DateTime<Utc>) -> Self {
        let mut last_updated = HashMap::new();
        last_updated.insert(status.as_str().to_string(), now);
        Self {
            job_key,
            status,
            last_updated,
        }
    }

    /// Returns the timestamp at which `name` (a status or phase name) was
    /// last observed.
    #[must_use]
    pub fn last_updated_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.last_updated.get(name).copied()
    }

    /// Returns the age of the `name` stamp at `now`.
    ///
    /// A missing stamp is treated as infinitely old, which biases the
    /// grace-window rules toward acting rather than waiting forever on a
    /// record that never received the stamp.
    #[must_use]
    pub fn age_of(&self, name: &str, now: DateTime<Utc>) -> Duration {
        self.last_updated_at(name)
            .map_or(Duration::MAX, |at| now - at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_progress_statuses() {
        assert!(JobStatus::Enqueuing.is_in_progress());
        assert!(JobStatus::Running.is_in_progress());
        assert!(!JobStatus::Succeeded.is_in_progress());
        assert!(!JobStatus::UnexpectedError.is_in_progress());
    }

    #[test]
    fn terminal_is_the_complement_of_in_progress() {
        for status in [
            JobStatus::Enqueuing,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::CompletedWithFailures,
            JobStatus::TimedOut,
            JobStatus::EnqueueFailed,
            JobStatus::WorkerOom,
            JobStatus::WorkerError,
            JobStatus::UnexpectedError,
        ] {
            assert_eq!(status.is_terminal(), !status.is_in_progress());
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::CompletedWithFailures).unwrap();
        assert_eq!(json, "\"completed_with_failures\"");
    }

    #[test]
    fn new_state_stamps_the_initial_status() {
        let now = Utc::now();
        let state = JobState::new(JobKey::new("api", "j1"), JobStatus::Enqueuing, now);
        assert_eq!(state.last_updated_at("enqueuing"), Some(now));
        assert_eq!(state.age_of("enqueuing", now), Duration::zero());
    }

    #[test]
    fn missing_stamp_is_infinitely_old() {
        let now = Utc::now();
        let state = JobState::new(JobKey::new("api", "j1"), JobStatus::Enqueuing, now);
        assert_eq!(state.age_of("running", now), Duration::MAX);
    }
}
