//! # strata-core
//!
//! Core abstractions for the Strata batch API platform.
//!
//! This crate provides the foundational types used across all Strata
//! components:
//!
//! - **Job Identity**: Strongly-typed job keys and API kinds
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Structured-logging initialization and span helpers
//!
//! ## Crate Boundary
//!
//! `strata-core` is the only crate allowed to define shared primitives.
//! Domain crates (submission, enqueuing, reconciliation) build on top of
//! these types and never redefine them.
//!
//! ## Example
//!
//! ```rust
//! use strata_core::{ApiKind, JobKey};
//!
//! let key = JobKey::new("image-classifier", "69d5af5e2f8a");
//! assert_eq!(key.user_string(), "69d5af5e2f8a (api image-classifier)");
//! assert_eq!(ApiKind::Batch.as_str(), "batch");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

pub use error::{Error, Result};
pub use id::{ApiKind, JobKey};
pub use observability::{LogFormat, init_logging, job_span};
