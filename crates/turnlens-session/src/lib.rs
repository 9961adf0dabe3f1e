//! TurnLens Session Engine
//!
//! This crate turns the tap's event stream into per-turn latency records:
//! - Turn segmentation from speech boundary events
//! - Measurement attribution with a grace window for late figures
//! - End-of-session aggregation and report rendering
//! - Tap adapter with de-duplication and a thread-safe handle

pub mod config;
mod instrument;
pub mod report;
pub mod segmenter;
pub mod session;
pub mod sink;
pub mod tap;

pub use config::ObserverConfig;
pub use report::{Column, DropCounts, LatencyStats, SessionReport, UsageTotals};
pub use segmenter::{Transition, TurnSegmenter};
pub use session::Session;
pub use sink::{LogSink, MemorySink, TracingSink};
pub use tap::{Direction, Observer, SharedObserver, TapFrame};
