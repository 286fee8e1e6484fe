//! Observability for Simplex
//!
//! This crate provides:
//! - Structured logging via tracing
//! - Prometheus metrics export
//! - Connection and message counters for the transport servers
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("simplex", LogFormat::Pretty)?;
//! observability::metrics::init_metrics(9090)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{init_metrics, ServerMetrics};
