//! Metric router
//!
//! Classifies the producer of a measurement and writes the figures that
//! apply to that producer kind into a turn:
//! - TTFB figures become the stage latency of the producer's kind
//! - The turn detector contributes its end-to-end decision time only
//! - Token and character counts are summed across measurements

use crate::registry::ProducerRegistry;
use std::collections::HashMap;
use turnlens_core::{Error, MeasurementFields, ProducerKind, Result, Turn, TurnField};

/// A change the router made (or declined to make) to a turn
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Latency { field: TurnField, seconds: f64 },
    Count { field: TurnField, added: u64, total: u64 },
    /// The turn already had this latency; the new figure was discarded
    DuplicateLatency { field: TurnField, seconds: f64 },
}

impl FieldUpdate {
    pub fn field(&self) -> TurnField {
        match self {
            FieldUpdate::Latency { field, .. } => *field,
            FieldUpdate::Count { field, .. } => *field,
            FieldUpdate::DuplicateLatency { field, .. } => *field,
        }
    }

    /// Whether the turn was modified
    pub fn is_applied(&self) -> bool {
        !matches!(self, FieldUpdate::DuplicateLatency { .. })
    }
}

/// Routes measurement figures into turn fields
#[derive(Debug, Clone)]
pub struct MetricRouter {
    registry: ProducerRegistry,
    /// Producer name -> kind for names the registry matched
    cache: HashMap<String, ProducerKind>,
}

impl MetricRouter {
    pub fn new(registry: ProducerRegistry) -> Self {
        Self {
            registry,
            cache: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &ProducerRegistry {
        &self.registry
    }

    /// Resolve the producer kind, preferring an explicit kind from the producer
    pub fn classify(
        &mut self,
        producer_name: &str,
        explicit: Option<ProducerKind>,
    ) -> Result<ProducerKind> {
        if let Some(kind) = explicit {
            return Ok(kind);
        }

        if let Some(kind) = self.cache.get(producer_name) {
            return Ok(*kind);
        }

        // Only matches are cached; unknown names can be unbounded
        let kind = self
            .registry
            .classify(producer_name)
            .ok_or_else(|| Error::UnknownProducer(producer_name.to_string()))?;
        self.cache.insert(producer_name.to_string(), kind);
        Ok(kind)
    }

    /// Apply the figures relevant to `kind` to the turn
    pub fn apply(kind: ProducerKind, fields: &MeasurementFields, turn: &mut Turn) -> Vec<FieldUpdate> {
        let mut updates = Vec::new();

        match kind {
            ProducerKind::Stt => {
                if let Some(ttfb) = valid_latency(fields.ttfb_seconds) {
                    updates.push(set_latency(turn, TurnField::SttLatency, ttfb));
                }
            }
            ProducerKind::TurnDetector => {
                if fields.is_complete == Some(false) {
                    tracing::trace!(
                        turn = turn.turn_number,
                        "Ignoring incomplete turn detector verdict"
                    );
                } else if let Some(e2e_ms) = valid_latency(fields.e2e_latency_ms) {
                    updates.push(set_latency(
                        turn,
                        TurnField::TurnDetectionLatency,
                        e2e_ms / 1000.0,
                    ));
                } else if fields.inference_latency_ms.is_some() {
                    // Raw inference time alone does not describe the decision latency
                    tracing::trace!(
                        turn = turn.turn_number,
                        "Turn detector reported inference time only"
                    );
                }
            }
            ProducerKind::Llm => {
                if let Some(ttfb) = valid_latency(fields.ttfb_seconds) {
                    updates.push(set_latency(turn, TurnField::LlmLatency, ttfb));
                }
                if let Some(tokens) = fields.prompt_tokens {
                    updates.push(add_count(turn, TurnField::LlmPromptTokens, tokens));
                }
                if let Some(tokens) = fields.completion_tokens {
                    updates.push(add_count(turn, TurnField::LlmCompletionTokens, tokens));
                }
            }
            ProducerKind::Tts => {
                if let Some(ttfb) = valid_latency(fields.ttfb_seconds) {
                    updates.push(set_latency(turn, TurnField::TtsLatency, ttfb));
                }
                if let Some(chars) = fields.character_count {
                    updates.push(add_count(turn, TurnField::TtsCharacters, chars));
                }
            }
        }

        if updates.is_empty() {
            tracing::debug!(
                turn = turn.turn_number,
                kind = %kind,
                ?fields,
                "Measurement carried no figures applicable to its producer kind"
            );
        }

        updates
    }
}

fn valid_latency(value: Option<f64>) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => Some(v),
        Some(v) => {
            tracing::debug!(value = v, "Discarding invalid latency figure");
            None
        }
        None => None,
    }
}

fn set_latency(turn: &mut Turn, field: TurnField, seconds: f64) -> FieldUpdate {
    if turn.set_latency(field, seconds) {
        FieldUpdate::Latency { field, seconds }
    } else {
        tracing::debug!(
            turn = turn.turn_number,
            field = %field,
            seconds,
            "Latency already recorded for turn, keeping first value"
        );
        FieldUpdate::DuplicateLatency { field, seconds }
    }
}

fn add_count(turn: &mut Turn, field: TurnField, added: u64) -> FieldUpdate {
    let total = turn.add_count(field, added).unwrap_or(added);
    FieldUpdate::Count {
        field,
        added,
        total,
    }
}
