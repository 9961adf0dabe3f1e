//! TurnLens Metric Routing
//!
//! This crate decides where a measurement lands:
//! - Producer registry mapping producer names to producer kinds
//! - Metric router writing measurement figures into turn fields

pub mod registry;
pub mod router;

// Re-export commonly used types
pub use registry::{ProducerRegistry, ProducerRule};
pub use router::{FieldUpdate, MetricRouter};
