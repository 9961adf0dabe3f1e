//! Pipeline events as seen through the tap
//!
//! Timestamps are seconds on the pipeline's clock. They are optional on the
//! wire so that a frame missing its timestamp still deserializes and can be
//! rejected as malformed by the engine instead of failing the whole stream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Events the engine understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// VAD detected the user resuming speech
    UserStartedSpeaking { timestamp: Option<f64> },

    /// VAD detected the end of a user utterance; opens a turn
    UserStoppedSpeaking { timestamp: Option<f64> },

    /// First audio of the bot response; closes the open turn
    BotStartedSpeaking { timestamp: Option<f64> },

    /// Performance or usage figures reported by a producer
    Measurement {
        timestamp: Option<f64>,
        producer_name: String,
        /// Explicit kind supplied by the producer, bypasses name classification
        #[serde(default, skip_serializing_if = "Option::is_none")]
        producer_kind: Option<ProducerKind>,
        #[serde(flatten)]
        fields: MeasurementFields,
    },

    /// Normal end of the call
    SessionEnd { timestamp: Option<f64> },

    /// Pipeline cancellation; finalizes the session like `SessionEnd`
    Cancel { timestamp: Option<f64> },

    /// Anything else flowing through the pipeline
    #[serde(other)]
    Other,
}

impl Event {
    pub fn user_started(timestamp: f64) -> Self {
        Event::UserStartedSpeaking {
            timestamp: Some(timestamp),
        }
    }

    pub fn user_stopped(timestamp: f64) -> Self {
        Event::UserStoppedSpeaking {
            timestamp: Some(timestamp),
        }
    }

    pub fn bot_started(timestamp: f64) -> Self {
        Event::BotStartedSpeaking {
            timestamp: Some(timestamp),
        }
    }

    pub fn session_end(timestamp: f64) -> Self {
        Event::SessionEnd {
            timestamp: Some(timestamp),
        }
    }

    pub fn cancel(timestamp: f64) -> Self {
        Event::Cancel {
            timestamp: Some(timestamp),
        }
    }

    pub fn measurement(
        producer_name: impl Into<String>,
        timestamp: f64,
        fields: MeasurementFields,
    ) -> Self {
        Event::Measurement {
            timestamp: Some(timestamp),
            producer_name: producer_name.into(),
            producer_kind: None,
            fields,
        }
    }

    /// Timestamp carried by the event, if any
    pub fn timestamp(&self) -> Option<f64> {
        match self {
            Self::UserStartedSpeaking { timestamp } => *timestamp,
            Self::UserStoppedSpeaking { timestamp } => *timestamp,
            Self::BotStartedSpeaking { timestamp } => *timestamp,
            Self::Measurement { timestamp, .. } => *timestamp,
            Self::SessionEnd { timestamp } => *timestamp,
            Self::Cancel { timestamp } => *timestamp,
            Self::Other => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::UserStartedSpeaking { .. } => "user_started_speaking",
            Self::UserStoppedSpeaking { .. } => "user_stopped_speaking",
            Self::BotStartedSpeaking { .. } => "bot_started_speaking",
            Self::Measurement { .. } => "measurement",
            Self::SessionEnd { .. } => "session_end",
            Self::Cancel { .. } => "cancel",
            Self::Other => "other",
        }
    }

    /// Whether this event terminates the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionEnd { .. } | Self::Cancel { .. })
    }
}

/// Producer families the engine attributes measurements to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    Stt,
    TurnDetector,
    Llm,
    Tts,
}

impl ProducerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProducerKind::Stt => "stt",
            ProducerKind::TurnDetector => "turn_detector",
            ProducerKind::Llm => "llm",
            ProducerKind::Tts => "tts",
        }
    }
}

impl fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Figures carried by a measurement event
///
/// Which ones are meaningful depends on the producer kind; the router
/// ignores figures that do not apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementFields {
    /// Time to first output unit, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttfb_seconds: Option<f64>,

    /// Turn detector end-to-end decision time, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e2e_latency_ms: Option<f64>,

    /// Turn detector raw model inference time, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_latency_ms: Option<f64>,

    /// Turn detector verdict; `Some(false)` means the user is not done yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,

    /// Characters sent to speech synthesis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_count: Option<u64>,
}

impl MeasurementFields {
    pub fn ttfb(seconds: f64) -> Self {
        Self {
            ttfb_seconds: Some(seconds),
            ..Self::default()
        }
    }

    pub fn turn_detection(e2e_ms: f64) -> Self {
        Self {
            e2e_latency_ms: Some(e2e_ms),
            is_complete: Some(true),
            ..Self::default()
        }
    }

    pub fn llm_usage(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
            ..Self::default()
        }
    }

    pub fn characters(count: u64) -> Self {
        Self {
            character_count: Some(count),
            ..Self::default()
        }
    }

    pub fn with_characters(mut self, count: u64) -> Self {
        self.character_count = Some(count);
        self
    }

    pub fn with_inference_ms(mut self, inference_ms: f64) -> Self {
        self.inference_latency_ms = Some(inference_ms);
        self
    }

    pub fn with_complete(mut self, complete: bool) -> Self {
        self.is_complete = Some(complete);
        self
    }

    /// True when no figure is present (the verdict flag alone is not a figure)
    pub fn is_empty(&self) -> bool {
        self.ttfb_seconds.is_none()
            && self.e2e_latency_ms.is_none()
            && self.inference_latency_ms.is_none()
            && self.prompt_tokens.is_none()
            && self.completion_tokens.is_none()
            && self.character_count.is_none()
    }
}
