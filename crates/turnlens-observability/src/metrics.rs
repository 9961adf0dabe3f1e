//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for the turn engine:
//! - Turn counts by outcome (complete, partial)
//! - Per-stage latency histograms (total, stt, turn detection, llm, tts)
//! - Measurement counts by producer kind and drop counts by reason
//! - LLM token and TTS character usage
//!
//! Recording only touches in-memory atomics, so it is safe to call from the
//! per-event path. Serving the exposition text is left to the host process.

use prometheus::{Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Latency buckets sized for conversational voice (tens of ms to seconds)
const STAGE_LATENCY_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0,
];

/// Metrics collector for the turn engine
#[derive(Clone)]
pub struct TurnMetrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Turns closed, by status (complete, partial)
    pub turns_total: CounterVec,
    /// Sessions finalized
    pub sessions_total: Counter,

    /// Measurements attributed to a turn, by producer kind
    pub measurements_total: CounterVec,
    /// Events discarded, by reason
    pub events_dropped_total: CounterVec,

    /// Latency per stage (total, stt, turn_detection, llm, tts)
    pub stage_latency_seconds: HistogramVec,

    /// LLM tokens, by direction (prompt, completion)
    pub llm_tokens_total: CounterVec,
    /// Characters sent to speech synthesis
    pub tts_characters_total: Counter,
}

impl TurnMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let turns_total = CounterVec::new(
            Opts::new("turnlens_turns_total", "Total number of closed turns"),
            &["status"],
        )?;

        let sessions_total = Counter::with_opts(Opts::new(
            "turnlens_sessions_total",
            "Total number of finalized sessions",
        ))?;

        let measurements_total = CounterVec::new(
            Opts::new(
                "turnlens_measurements_total",
                "Total number of measurements attributed to a turn",
            ),
            &["kind"],
        )?;

        let events_dropped_total = CounterVec::new(
            Opts::new(
                "turnlens_events_dropped_total",
                "Total number of events discarded by the engine",
            ),
            &["reason"],
        )?;

        let stage_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "turnlens_stage_latency_seconds",
                "Per-turn latency by pipeline stage in seconds",
            )
            .buckets(STAGE_LATENCY_BUCKETS.to_vec()),
            &["stage"],
        )?;

        let llm_tokens_total = CounterVec::new(
            Opts::new("turnlens_llm_tokens_total", "Total LLM tokens attributed to turns"),
            &["direction"],
        )?;

        let tts_characters_total = Counter::with_opts(Opts::new(
            "turnlens_tts_characters_total",
            "Total characters sent to speech synthesis",
        ))?;

        registry.register(Box::new(turns_total.clone()))?;
        registry.register(Box::new(sessions_total.clone()))?;
        registry.register(Box::new(measurements_total.clone()))?;
        registry.register(Box::new(events_dropped_total.clone()))?;
        registry.register(Box::new(stage_latency_seconds.clone()))?;
        registry.register(Box::new(llm_tokens_total.clone()))?;
        registry.register(Box::new(tts_characters_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            turns_total,
            sessions_total,
            measurements_total,
            events_dropped_total,
            stage_latency_seconds,
            llm_tokens_total,
            tts_characters_total,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        TextEncoder::new().encode_to_string(&metric_families)
    }

    /// Record a closed turn; `total_latency` is absent for partial turns
    pub fn record_turn(&self, status: &str, total_latency: Option<f64>) {
        self.turns_total.with_label_values(&[status]).inc();
        if let Some(total) = total_latency {
            self.record_stage_latency("total", total);
        }
    }

    /// Record a per-stage latency
    pub fn record_stage_latency(&self, stage: &str, seconds: f64) {
        self.stage_latency_seconds
            .with_label_values(&[stage])
            .observe(seconds);
    }

    /// Record an attributed measurement
    pub fn record_measurement(&self, kind: &str) {
        self.measurements_total.with_label_values(&[kind]).inc();
    }

    /// Record a discarded event
    pub fn record_drop(&self, reason: &str) {
        self.events_dropped_total.with_label_values(&[reason]).inc();
    }

    /// Record token usage
    pub fn record_llm_tokens(&self, prompt_tokens: u64, completion_tokens: u64) {
        self.llm_tokens_total
            .with_label_values(&["prompt"])
            .inc_by(prompt_tokens as f64);
        self.llm_tokens_total
            .with_label_values(&["completion"])
            .inc_by(completion_tokens as f64);
    }

    /// Record synthesized characters
    pub fn record_tts_characters(&self, characters: u64) {
        self.tts_characters_total.inc_by(characters as f64);
    }

    /// Record a finalized session
    pub fn record_session(&self) {
        self.sessions_total.inc();
    }
}
