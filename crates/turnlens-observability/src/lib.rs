//! TurnLens Observability
//!
//! This crate provides the ambient observability features:
//! - Metrics collection (Prometheus)
//! - Structured logging setup

pub mod logging;
pub mod metrics;

pub use logging::{LoggingConfig, init_logging};
pub use metrics::TurnMetrics;
