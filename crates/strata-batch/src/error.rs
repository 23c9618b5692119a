//! Error types for the batch reconciliation domain.

/// The result type used throughout strata-batch.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reconciling batch jobs.
///
/// Each external surface the reconciler talks to gets its own variant so
/// per-job error telemetry can name the failing system.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A job-state store operation failed.
    #[error("state store error: {message}")]
    StateStore {
        /// Description of the failure.
        message: String,
    },

    /// A queue-service operation failed.
    #[error("queue service error: {message}")]
    Queue {
        /// Description of the failure.
        message: String,
    },

    /// A cluster orchestrator operation failed.
    #[error("cluster error: {message}")]
    Cluster {
        /// Description of the failure.
        message: String,
    },

    /// A job-spec download from object storage failed.
    #[error("spec store error: {message}")]
    SpecStore {
        /// Description of the failure.
        message: String,
    },

    /// A batch-metrics fetch failed.
    #[error("metrics backend error: {message}")]
    Metrics {
        /// Description of the failure.
        message: String,
    },

    /// A write to a job's user-visible log stream failed.
    #[error("log stream error: {message}")]
    LogStream {
        /// Description of the failure.
        message: String,
    },

    /// An external call exceeded its deadline.
    #[error("timed out waiting for {operation}")]
    Timeout {
        /// The operation that exceeded its deadline.
        operation: String,
    },

    /// A configuration value was missing or invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An error from strata-core.
    #[error("core error: {0}")]
    Core(#[from] strata_core::Error),
}

impl Error {
    /// Creates a new state-store error.
    #[must_use]
    pub fn state_store(message: impl Into<String>) -> Self {
        Self::StateStore {
            message: message.into(),
        }
    }

    /// Creates a new queue-service error.
    #[must_use]
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Creates a new cluster error.
    #[must_use]
    pub fn cluster(message: impl Into<String>) -> Self {
        Self::Cluster {
            message: message.into(),
        }
    }

    /// Creates a new spec-store error.
    #[must_use]
    pub fn spec_store(message: impl Into<String>) -> Self {
        Self::SpecStore {
            message: message.into(),
        }
    }

    /// Creates a new metrics-backend error.
    #[must_use]
    pub fn metrics(message: impl Into<String>) -> Self {
        Self::Metrics {
            message: message.into(),
        }
    }

    /// Creates a new log-stream error.
    #[must_use]
    pub fn log_stream(message: impl Into<String>) -> Self {
        Self::LogStream {
            message: message.into(),
        }
    }

    /// Creates a new timeout error for the named operation.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns a short stage label for error telemetry.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::StateStore { .. } => "state_store",
            Self::Queue { .. } => "queue",
            Self::Cluster { .. } => "cluster",
            Self::SpecStore { .. } => "spec_store",
            Self::Metrics { .. } => "metrics",
            Self::LogStream { .. } => "log_stream",
            Self::Timeout { .. } => "timeout",
            Self::Configuration { .. } => "configuration",
            Self::Serialization { .. } => "serialization",
            Self::Core(_) => "core",
        }
    }
}

/// Returns the first error among `results`, after all of them have been
/// produced.
///
/// Teardown paths must attempt every cleanup even when an earlier step
/// failed: a failure to delete the queue must not prevent attempting to
/// delete the worker batch. Callers await each effect, collect the
/// results, and pass them here.
///
/// # Errors
///
/// Returns the first `Err` in iteration order, if any.
pub fn first_error<I>(results: I) -> Result<()>
where
    I: IntoIterator<Item = Result<()>>,
{
    let mut first = None;
    for result in results {
        if let Err(err) = result {
            if first.is_none() {
                first = Some(err);
            }
        }
    }
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
