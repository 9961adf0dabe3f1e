//! TurnLens Core Types
//!
//! This crate provides the fundamental types shared by the TurnLens crates:
//! - Pipeline events observed through the tap
//! - Turn records and their tracked fields
//! - Core error types

pub mod error;
pub mod events;
pub mod turn;

pub use error::{DropReason, Error, Result};
pub use events::{Event, MeasurementFields, ProducerKind};
pub use turn::{Turn, TurnField, TurnStatus};
