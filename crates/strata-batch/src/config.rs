//! Reconciler configuration with environment loading and strict validation.
//!
//! Each external system's consistency bound is encoded as a named grace
//! duration and compared against observed timestamps; the reconciler never
//! sleeps inside a pass. The durations are operator-tunable through the
//! environment but validated strictly so a typo fails startup instead of
//! silently disabling a grace window.

use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::error::{Error, Result};

const ENV_RECONCILE_PERIOD_SECS: &str = "STRATA_BATCH_RECONCILE_PERIOD_SECS";
const ENV_QUEUE_EXIST_GRACE_SECS: &str = "STRATA_BATCH_QUEUE_EXIST_GRACE_SECS";
const ENV_ENQUEUING_LIVENESS_PERIOD_SECS: &str = "STRATA_BATCH_ENQUEUING_LIVENESS_PERIOD_SECS";
const ENV_ENQUEUING_LIVENESS_BUFFER_SECS: &str = "STRATA_BATCH_ENQUEUING_LIVENESS_BUFFER_SECS";
const ENV_WORKER_BATCH_EXIST_GRACE_SECS: &str = "STRATA_BATCH_WORKER_BATCH_EXIST_GRACE_SECS";
const ENV_QUEUE_URL_BASE: &str = "STRATA_BATCH_QUEUE_URL_BASE";

// The reconcile period must stay >= worker-exit latency plus the
// metrics-consistency window; the batch workers assume it.
const DEFAULT_RECONCILE_PERIOD_SECS: u64 = 60;
const DEFAULT_QUEUE_EXIST_GRACE_SECS: u64 = 30;
const DEFAULT_ENQUEUING_LIVENESS_PERIOD_SECS: u64 = 20;
const DEFAULT_ENQUEUING_LIVENESS_BUFFER_SECS: u64 = 30;
const DEFAULT_WORKER_BATCH_EXIST_GRACE_SECS: u64 = 10;

/// Grace-window and cadence configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Cadence of reconciliation passes.
    pub reconcile_period: StdDuration,
    /// Window during which a job's queue may legitimately be missing from
    /// queue-service listings; hides newly created queues from both the
    /// missing-queue error and GC.
    pub queue_exist_grace_period: Duration,
    /// Cadence at which the enqueuing process stamps its liveness.
    pub enqueuing_liveness_period: Duration,
    /// Slack added to the liveness period before declaring enqueue failure.
    pub enqueuing_liveness_buffer: Duration,
    /// Window during which a running job's worker batch may legitimately be
    /// missing from orchestrator listings.
    pub worker_batch_exist_grace_period: Duration,
    /// Deadline applied to each collection-level external call so a slow
    /// backend cannot starve the pass.
    pub external_call_timeout: StdDuration,
    /// Base URL under which job queues are created.
    pub queue_url_base: String,
}

impl ReconcilerConfig {
    /// Creates a config with default grace windows and the given queue
    /// URL base.
    #[must_use]
    pub fn new(queue_url_base: impl Into<String>) -> Self {
        Self {
            reconcile_period: StdDuration::from_secs(DEFAULT_RECONCILE_PERIOD_SECS),
            queue_exist_grace_period: seconds(DEFAULT_QUEUE_EXIST_GRACE_SECS),
            enqueuing_liveness_period: seconds(DEFAULT_ENQUEUING_LIVENESS_PERIOD_SECS),
            enqueuing_liveness_buffer: seconds(DEFAULT_ENQUEUING_LIVENESS_BUFFER_SECS),
            worker_batch_exist_grace_period: seconds(DEFAULT_WORKER_BATCH_EXIST_GRACE_SECS),
            external_call_timeout: StdDuration::from_secs(DEFAULT_RECONCILE_PERIOD_SECS / 2),
            queue_url_base: queue_url_base.into(),
        }
    }

    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `STRATA_BATCH_QUEUE_URL_BASE`
    /// is missing or a duration value is not a positive integer.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// This entry point is test-friendly and accepts a key lookup function.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the queue URL base is missing or
    /// a duration value is not a positive integer.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let queue_url_base = get_env(ENV_QUEUE_URL_BASE)
            .ok_or_else(|| Error::configuration(format!("missing {ENV_QUEUE_URL_BASE}")))?;

        let reconcile_period_secs = parse_positive_u64_env(
            &get_env,
            ENV_RECONCILE_PERIOD_SECS,
            DEFAULT_RECONCILE_PERIOD_SECS,
        )?;
        let queue_exist_grace_secs = parse_positive_u64_env(
            &get_env,
            ENV_QUEUE_EXIST_GRACE_SECS,
            DEFAULT_QUEUE_EXIST_GRACE_SECS,
        )?;
        let liveness_period_secs = parse_positive_u64_env(
            &get_env,
            ENV_ENQUEUING_LIVENESS_PERIOD_SECS,
            DEFAULT_ENQUEUING_LIVENESS_PERIOD_SECS,
        )?;
        let liveness_buffer_secs = parse_positive_u64_env(
            &get_env,
            ENV_ENQUEUING_LIVENESS_BUFFER_SECS,
            DEFAULT_ENQUEUING_LIVENESS_BUFFER_SECS,
        )?;
        let batch_exist_grace_secs = parse_positive_u64_env(
            &get_env,
            ENV_WORKER_BATCH_EXIST_GRACE_SECS,
            DEFAULT_WORKER_BATCH_EXIST_GRACE_SECS,
        )?;

        Ok(Self {
            reconcile_period: StdDuration::from_secs(reconcile_period_secs),
            queue_exist_grace_period: seconds(queue_exist_grace_secs),
            enqueuing_liveness_period: seconds(liveness_period_secs),
            enqueuing_liveness_buffer: seconds(liveness_buffer_secs),
            worker_batch_exist_grace_period: seconds(batch_exist_grace_secs),
            external_call_timeout: StdDuration::from_secs((reconcile_period_secs / 2).max(1)),
            queue_url_base,
        })
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

fn parse_positive_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };

    let parsed = raw.parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a positive integer, got '{raw}'"))
    })?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn defaults_match_the_documented_windows() {
        let config = ReconcilerConfig::new("https://queue.strata.local/jobs");
        assert_eq!(config.reconcile_period, StdDuration::from_secs(60));
        assert_eq!(config.queue_exist_grace_period, Duration::seconds(30));
        assert_eq!(config.enqueuing_liveness_buffer, Duration::seconds(30));
        assert_eq!(config.worker_batch_exist_grace_period, Duration::seconds(10));
        assert_eq!(config.external_call_timeout, StdDuration::from_secs(30));
    }

    #[test]
    fn from_env_requires_the_queue_url_base() {
        let result = ReconcilerConfig::from_env_with(env(&[]));
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn from_env_overrides_durations() {
        let config = ReconcilerConfig::from_env_with(env(&[
            (ENV_QUEUE_URL_BASE, "https://queue.strata.local/jobs"),
            (ENV_RECONCILE_PERIOD_SECS, "120"),
            (ENV_QUEUE_EXIST_GRACE_SECS, "45"),
        ]))
        .unwrap();
        assert_eq!(config.reconcile_period, StdDuration::from_secs(120));
        assert_eq!(config.queue_exist_grace_period, Duration::seconds(45));
        assert_eq!(config.external_call_timeout, StdDuration::from_secs(60));
        // Unset knobs keep their defaults.
        assert_eq!(config.enqueuing_liveness_period, Duration::seconds(20));
    }

    #[test]
    fn from_env_rejects_zero_and_garbage() {
        let zero = ReconcilerConfig::from_env_with(env(&[
            (ENV_QUEUE_URL_BASE, "https://queue.strata.local/jobs"),
            (ENV_RECONCILE_PERIOD_SECS, "0"),
        ]));
        assert!(matches!(zero, Err(Error::Configuration { .. })));

        let garbage = ReconcilerConfig::from_env_with(env(&[
            (ENV_QUEUE_URL_BASE, "https://queue.strata.local/jobs"),
            (ENV_QUEUE_EXIST_GRACE_SECS, "soon"),
        ]));
        assert!(matches!(garbage, Err(Error::Configuration { .. })));
    }
}
