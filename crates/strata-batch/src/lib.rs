//! # strata-batch
//!
//! Batch-job reconciliation core for the Strata platform.
//!
//! The platform accepts user-submitted batch jobs, provisions a work queue
//! and a set of worker pods on the cluster, and drives each job from
//! submission to a terminal state. This crate implements the reconciler
//! that, on a fixed cadence, compares three independent views of the world:
//!
//! - the platform's durable job-state store,
//! - the set of work queues the platform has created,
//! - the set of worker batches managed by the cluster orchestrator,
//!
//! and advances, repairs, or tears down jobs to make those views
//! consistent.
//!
//! ## Why reconciliation is hard here
//!
//! There is no single source of truth. The state store may lag the
//! orchestrator, queue-metrics APIs are eventually consistent, pods may
//! vanish, and the reconciler itself may crash and resume. Grace windows
//! and a "confirm on the next tick" protocol convert that eventual
//! consistency into bounded-time decisions without ever producing a false
//! terminal classification.
//!
//! ## Guarantees
//!
//! - **Correct terminal states**: succeeded vs. completed-with-failures
//!   vs. worker-OOM vs. unexpected-error, despite metric skew
//! - **No orphaned resources**: queues and worker batches belonging to
//!   jobs no longer in progress are garbage collected
//! - **Crash recovery**: a pass interrupted mid-teardown is completed by
//!   the next pass
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use strata_batch::clients::memory::{
//!     InMemoryClusterClient, InMemoryJobLogStream, InMemoryMetricsClient,
//!     InMemoryQueueClient, InMemorySpecStore, InMemoryStateStore,
//! };
//! use strata_batch::config::ReconcilerConfig;
//! use strata_batch::reconciler::{Clients, Reconciler};
//!
//! # #[tokio::main]
//! # async fn main() -> strata_batch::error::Result<()> {
//! let config = ReconcilerConfig::new("https://queue.strata.local/jobs");
//! let clients = Clients {
//!     state_store: Arc::new(InMemoryStateStore::new()),
//!     queues: Arc::new(InMemoryQueueClient::new()),
//!     cluster: Arc::new(InMemoryClusterClient::new()),
//!     specs: Arc::new(InMemorySpecStore::new()),
//!     batch_metrics: Arc::new(InMemoryMetricsClient::new()),
//!     log_stream: Arc::new(InMemoryJobLogStream::new()),
//! };
//!
//! let mut reconciler = Reconciler::new(config, clients);
//! reconciler.reconcile_once().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod clients;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod reconciler;
pub mod spec;
pub mod state;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::clients::{
        BatchCounts, ClusterClient, JobLogStream, MetricsClient, QueueClient, SpecStore,
        StateStore, WorkerBatch, WorkerPod,
    };
    pub use crate::config::ReconcilerConfig;
    pub use crate::error::{Error, Result, first_error};
    pub use crate::queue::{QueueMetrics, QueueUrl};
    pub use crate::reconciler::{Clients, Reconciler};
    pub use crate::spec::BatchJobSpec;
    pub use crate::state::{JobState, JobStatus};
}
