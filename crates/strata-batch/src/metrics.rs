//! Observability metrics for the batch reconciler.
//!
//! Metrics are recorded through the `metrics` crate facade; the embedding
//! process decides which exporter to install (Prometheus in production).
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `strata_batch_reconcile_passes_total` | Counter | `status` | Reconciliation passes by outcome |
//! | `strata_batch_reconcile_pass_duration_seconds` | Histogram | - | Pass duration |
//! | `strata_batch_job_errors_total` | Counter | `stage` | Per-job errors by failing surface |
//! | `strata_batch_terminal_transitions_total` | Counter | `status` | Terminal classifications persisted |
//! | `strata_batch_in_progress_jobs` | Gauge | - | Jobs the platform currently owns |
//! | `strata_batch_deferred_jobs` | Gauge | - | Jobs waiting one cycle for metric consistency |
//! | `strata_batch_runtime_deletions_total` | Counter | `resource` | Queue/worker-batch deletions |

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Reconciliation passes by outcome.
    pub const RECONCILE_PASSES_TOTAL: &str = "strata_batch_reconcile_passes_total";
    /// Histogram: Reconciliation pass duration in seconds.
    pub const RECONCILE_PASS_DURATION_SECONDS: &str =
        "strata_batch_reconcile_pass_duration_seconds";
    /// Counter: Per-job errors by failing surface.
    pub const JOB_ERRORS_TOTAL: &str = "strata_batch_job_errors_total";
    /// Counter: Terminal classifications persisted.
    pub const TERMINAL_TRANSITIONS_TOTAL: &str = "strata_batch_terminal_transitions_total";
    /// Gauge: Jobs currently in progress.
    pub const IN_PROGRESS_JOBS: &str = "strata_batch_in_progress_jobs";
    /// Gauge: Jobs in the deferred-delete set.
    pub const DEFERRED_JOBS: &str = "strata_batch_deferred_jobs";
    /// Counter: Runtime resource deletions.
    pub const RUNTIME_DELETIONS_TOTAL: &str = "strata_batch_runtime_deletions_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Outcome status (ok, error) or terminal job status.
    pub const STATUS: &str = "status";
    /// Failing surface for per-job errors.
    pub const STAGE: &str = "stage";
    /// Deleted resource kind (queue, worker_batch).
    pub const RESOURCE: &str = "resource";
}

/// High-level interface for recording reconciler metrics.
///
/// Cheap to clone and share; holds no state beyond the facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcilerMetrics;

impl ReconcilerMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records the outcome of a reconciliation pass.
    pub fn record_pass(self, status: &str) {
        counter!(
            names::RECONCILE_PASSES_TOTAL,
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Records a per-job error against the failing surface.
    pub fn record_job_error(self, stage: &str) {
        counter!(
            names::JOB_ERRORS_TOTAL,
            labels::STAGE => stage.to_string(),
        )
        .increment(1);
    }

    /// Records a persisted terminal classification.
    pub fn record_terminal_transition(self, status: &str) {
        counter!(
            names::TERMINAL_TRANSITIONS_TOTAL,
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Updates the in-progress jobs gauge.
    #[allow(clippy::cast_precision_loss)] // Gauge values are small
    pub fn set_in_progress_jobs(self, count: usize) {
        gauge!(names::IN_PROGRESS_JOBS).set(count as f64);
    }

    /// Updates the deferred-delete set size gauge.
    #[allow(clippy::cast_precision_loss)] // Gauge values are small
    pub fn set_deferred_jobs(self, count: usize) {
        gauge!(names::DEFERRED_JOBS).set(count as f64);
    }

    /// Records a runtime resource deletion.
    pub fn record_runtime_deletion(self, resource: &str) {
        counter!(
            names::RUNTIME_DELETIONS_TOTAL,
            labels::RESOURCE => resource.to_string(),
        )
        .increment(1);
    }
}

/// RAII guard for timing operations.
///
/// Automatically records duration when dropped.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a new timing guard that will call `on_drop` with the
    /// elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

/// Creates a timing guard for the reconciliation pass histogram.
#[must_use]
pub fn time_reconcile_pass() -> TimingGuard<impl FnOnce(Duration)> {
    TimingGuard::new(|duration| {
        histogram!(names::RECONCILE_PASS_DURATION_SECONDS).record(duration.as_secs_f64());
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_record_without_an_installed_recorder() {
        let metrics = ReconcilerMetrics::new();
        metrics.record_pass("ok");
        metrics.record_job_error("queue");
        metrics.record_terminal_transition("succeeded");
        metrics.set_in_progress_jobs(3);
        metrics.set_deferred_jobs(1);
        metrics.record_runtime_deletion("queue");
    }

    #[test]
    fn timing_guard_measures_duration() {
        let mut recorded = None;
        {
            let _guard = TimingGuard::new(|d| {
                recorded = Some(d);
            });
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(recorded.is_some_and(|d| d >= Duration::from_millis(5)));
    }
}
