//! Output sinks for live event lines and report lines

use std::sync::{Arc, Mutex, PoisonError};

/// Destination for human-readable lines
///
/// Implementations must not block: `emit` is called on the per-event path.
pub trait LogSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Forwards lines to `tracing` at INFO on the `turnlens::live` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, line: &str) {
        tracing::info!(target: "turnlens::live", "{}", line);
    }
}

/// Collects lines in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines emitted so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn emit(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_shares_lines_between_clones() {
        let sink = MemorySink::new();
        let clone = sink.clone();
        sink.emit("turn 1 started at 0.000s");
        clone.emit("turn 1 complete: total=1.000s");

        assert_eq!(sink.lines().len(), 2);
        sink.clear();
        assert!(clone.lines().is_empty());
    }

    #[test]
    fn test_tracing_sink_without_subscriber() {
        // No subscriber installed: emitting must be a silent no-op
        TracingSink.emit("turn 1 started at 0.000s");
    }
}
