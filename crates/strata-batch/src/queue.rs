//! Work-queue naming, identity, and depth metrics.
//!
//! Every job owns one externally managed work queue. The queue service
//! addresses queues by URL; the URL's terminal path component encodes the
//! job identity under a fixed naming convention, so a `JobKey` is always
//! derivable from a queue URL and vice versa.
//!
//! ## Naming convention
//!
//! The terminal path component is `b-{api_name}-{job_id}`, where `job_id`
//! contains no `-`. Parsing is total: a segment that does not follow the
//! convention degrades to a key whose `api_name` and `id` are both the
//! raw segment, which still round-trips through map lookups.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strata_core::JobKey;

/// Queue-name prefix marking queues owned by the batch platform.
const QUEUE_NAME_PREFIX: &str = "b-";

/// Queue attribute holding the creation time as integer epoch seconds.
pub const CREATED_TIMESTAMP_ATTRIBUTE: &str = "CreatedTimestamp";

/// URL of an externally managed work queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueUrl(String);

impl QueueUrl {
    /// Wraps a raw queue URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Returns the raw URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the job key encoded in the URL's terminal path component.
    #[must_use]
    pub fn job_key(&self) -> JobKey {
        let segment = self
            .0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.0);
        let name = segment.strip_prefix(QUEUE_NAME_PREFIX).unwrap_or(segment);
        match name.rsplit_once('-') {
            Some((api_name, id)) if !api_name.is_empty() && !id.is_empty() => {
                JobKey::new(api_name, id)
            }
            _ => JobKey::new(name, name),
        }
    }
}

impl fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the queue name for a job under the naming convention.
#[must_use]
pub fn queue_name(key: &JobKey) -> String {
    format!("{QUEUE_NAME_PREFIX}{}-{}", key.api_name, key.id)
}

/// Returns the queue URL a job's queue is expected to live at.
#[must_use]
pub fn expected_queue_url(base: &str, key: &JobKey) -> QueueUrl {
    QueueUrl::new(format!("{}/{}", base.trim_end_matches('/'), queue_name(key)))
}

/// Parses the `CreatedTimestamp` attribute from a queue attributes map.
///
/// An absent or unparsable value is treated as the epoch, which is older
/// than any grace period and therefore makes the queue eligible for GC.
#[must_use]
pub fn created_timestamp(attributes: &HashMap<String, String>) -> DateTime<Utc> {
    attributes
        .get(CREATED_TIMESTAMP_ATTRIBUTE)
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Point-in-time message-depth metrics for one queue.
///
/// Queue metrics are eventually consistent; they lag the queue's true
/// contents by seconds. Callers must not treat a single observation as
/// authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueMetrics {
    /// Messages visible to workers.
    pub visible: u64,
    /// Messages leased by a worker but not yet deleted.
    pub in_flight: u64,
}

impl QueueMetrics {
    /// Returns true when no messages are visible or in flight.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.visible == 0 && self.in_flight == 0
    }

    /// Total message depth.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.visible + self.in_flight
    }
}
