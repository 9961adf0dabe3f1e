//! Optional Prometheus recording
//!
//! Compiles to no-ops unless the `metrics` feature is enabled and a
//! collector is attached to the session.

#[cfg(feature = "metrics")]
use std::sync::Arc;
#[cfg(feature = "metrics")]
use turnlens_observability::TurnMetrics;

use turnlens_core::{DropReason, ProducerKind, Turn, TurnField, TurnStatus};
use turnlens_routing::FieldUpdate;

#[derive(Clone, Default)]
pub(crate) struct Instruments {
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<TurnMetrics>>,
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
impl Instruments {
    #[cfg(feature = "metrics")]
    pub(crate) fn with_metrics(metrics: Arc<TurnMetrics>) -> Self {
        Self {
            metrics: Some(metrics),
        }
    }

    pub(crate) fn turn_closed(&self, turn: &Turn) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_turn(status_label(turn.status), turn.total_latency());
        }
    }

    pub(crate) fn measurement(&self, kind: ProducerKind, updates: &[FieldUpdate]) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            if updates.iter().any(FieldUpdate::is_applied) {
                metrics.record_measurement(kind.as_str());
            }
            for update in updates {
                match update {
                    FieldUpdate::Latency { field, seconds } => {
                        metrics.record_stage_latency(stage_label(*field), *seconds);
                    }
                    FieldUpdate::Count {
                        field: TurnField::LlmPromptTokens,
                        added,
                        ..
                    } => metrics.record_llm_tokens(*added, 0),
                    FieldUpdate::Count {
                        field: TurnField::LlmCompletionTokens,
                        added,
                        ..
                    } => metrics.record_llm_tokens(0, *added),
                    FieldUpdate::Count {
                        field: TurnField::TtsCharacters,
                        added,
                        ..
                    } => metrics.record_tts_characters(*added),
                    _ => {}
                }
            }
        }
    }

    pub(crate) fn dropped(&self, reason: DropReason) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_drop(reason.as_str());
        }
    }

    pub(crate) fn session_finished(&self) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_session();
        }
    }
}

#[cfg_attr(not(feature = "metrics"), allow(dead_code))]
pub(crate) fn status_label(status: TurnStatus) -> &'static str {
    match status {
        TurnStatus::Open => "open",
        TurnStatus::Complete => "complete",
        TurnStatus::Partial => "partial",
    }
}

#[cfg_attr(not(feature = "metrics"), allow(dead_code))]
pub(crate) fn stage_label(field: TurnField) -> &'static str {
    match field {
        TurnField::SttLatency => "stt",
        TurnField::TurnDetectionLatency => "turn_detection",
        TurnField::LlmLatency => "llm",
        TurnField::TtsLatency => "tts",
        other => other.as_str(),
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_records_usage_and_latency() {
        let metrics = Arc::new(TurnMetrics::new().unwrap());
        let instruments = Instruments::with_metrics(metrics.clone());

        instruments.measurement(
            ProducerKind::Llm,
            &[
                FieldUpdate::Latency {
                    field: TurnField::LlmLatency,
                    seconds: 0.08,
                },
                FieldUpdate::Count {
                    field: TurnField::LlmPromptTokens,
                    added: 100,
                    total: 100,
                },
            ],
        );

        assert_eq!(metrics.measurements_total.with_label_values(&["llm"]).get(), 1.0);
        assert_eq!(metrics.llm_tokens_total.with_label_values(&["prompt"]).get(), 100.0);
        assert_eq!(
            metrics
                .stage_latency_seconds
                .with_label_values(&["llm"])
                .get_sample_count(),
            1
        );
    }

    #[test]
    fn test_duplicate_only_is_not_counted() {
        let metrics = Arc::new(TurnMetrics::new().unwrap());
        let instruments = Instruments::with_metrics(metrics.clone());

        instruments.measurement(
            ProducerKind::Stt,
            &[FieldUpdate::DuplicateLatency {
                field: TurnField::SttLatency,
                seconds: 0.2,
            }],
        );
        assert_eq!(metrics.measurements_total.with_label_values(&["stt"]).get(), 0.0);
    }

    #[test]
    fn test_turn_and_drop_recording() {
        let metrics = Arc::new(TurnMetrics::new().unwrap());
        let instruments = Instruments::with_metrics(metrics.clone());

        let mut turn = Turn::open(1, 0.0);
        turn.close(1.0);
        instruments.turn_closed(&turn);
        instruments.dropped(DropReason::Unroutable);
        instruments.session_finished();

        assert_eq!(metrics.turns_total.with_label_values(&["complete"]).get(), 1.0);
        assert_eq!(metrics.events_dropped_total.with_label_values(&["unroutable"]).get(), 1.0);
        assert_eq!(metrics.sessions_total.get(), 1.0);
    }
}
