//! Error types for TurnLens Core

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Unroutable measurement from '{producer}' at {timestamp:.3}s: no open turn within the grace window")]
    UnroutableMeasurement { producer: String, timestamp: f64 },

    #[error("Unknown producer: {0}")]
    UnknownProducer(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Drop bucket for errors that cause an event to be discarded
    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            Error::MalformedEvent(_) => Some(DropReason::Malformed),
            Error::UnroutableMeasurement { .. } => Some(DropReason::Unroutable),
            Error::UnknownProducer(_) => Some(DropReason::UnknownProducer),
            _ => None,
        }
    }
}

/// Why an event was discarded by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Malformed,
    Unroutable,
    UnknownProducer,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed",
            DropReason::Unroutable => "unroutable",
            DropReason::UnknownProducer => "unknown_producer",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
