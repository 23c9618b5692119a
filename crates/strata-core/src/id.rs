//! Strongly-typed identity for user-facing APIs and their jobs.
//!
//! A batch API is addressed by name; every submission against it receives
//! an opaque job ID minted by the submission surface. The pair is the
//! stable identity that ties together the job-state store, the work queue,
//! and the worker batch on the cluster.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of a user-facing API hosted by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    /// Batch API: jobs decomposed into work items consumed from a queue.
    Batch,
}

impl ApiKind {
    /// Returns the canonical string form used in labels and selectors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a job.
///
/// Two jobs with equal `id` are the same job; `api_name` names the
/// user-facing API the job was submitted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobKey {
    /// Name of the user-facing API.
    pub api_name: String,
    /// Opaque unique job identifier.
    pub id: String,
}

impl JobKey {
    /// Creates a new job key.
    #[must_use]
    pub fn new(api_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            id: id.into(),
        }
    }

    /// Renders the key the way it is shown to users in log lines.
    #[must_use]
    pub fn user_string(&self) -> String {
        format!("{} (api {})", self.id, self.api_name)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_name, self.id)
    }
}
