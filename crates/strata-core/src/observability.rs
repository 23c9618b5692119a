//! Observability infrastructure for Strata.
//!
//! Structured logging with consistent spans across all platform
//! components. This module provides initialization helpers and span
//! constructors so every component logs the same fields for the same
//! operations.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `strata_batch=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for per-job operations with standard fields.
///
/// # Example
///
/// ```rust
/// use strata_core::observability::job_span;
///
/// let span = job_span("reconcile", "image-classifier", "69d5af5e2f8a");
/// let _guard = span.enter();
/// // ... operate on the job
/// ```
#[must_use]
pub fn job_span(operation: &str, api_name: &str, job_id: &str) -> Span {
    tracing::info_span!(
        "job",
        op = operation,
        api_name = api_name,
        job_id = job_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn job_span_creates_span() {
        let span = job_span("reconcile", "image-classifier", "abc123");
        let _guard = span.enter();
        tracing::info!("message in span");
    }
}
