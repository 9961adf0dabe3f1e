//! Turn records
//!
//! A turn spans one user utterance and the bot response to it: it opens when
//! the user stops speaking and closes when the bot starts speaking.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Open,
    Complete,
    /// Superseded by a new turn or cut off by session end
    Partial,
}

/// Per-turn tracked fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnField {
    SttLatency,
    TurnDetectionLatency,
    LlmLatency,
    TtsLatency,
    LlmPromptTokens,
    LlmCompletionTokens,
    TtsCharacters,
}

impl TurnField {
    pub const LATENCIES: [TurnField; 4] = [
        TurnField::SttLatency,
        TurnField::TurnDetectionLatency,
        TurnField::LlmLatency,
        TurnField::TtsLatency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TurnField::SttLatency => "stt_latency",
            TurnField::TurnDetectionLatency => "turn_detection_latency",
            TurnField::LlmLatency => "llm_latency",
            TurnField::TtsLatency => "tts_latency",
            TurnField::LlmPromptTokens => "llm_prompt_tokens",
            TurnField::LlmCompletionTokens => "llm_completion_tokens",
            TurnField::TtsCharacters => "tts_characters",
        }
    }

    pub fn is_latency(&self) -> bool {
        Self::LATENCIES.contains(self)
    }
}

impl fmt::Display for TurnField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-utterance-to-bot-response cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based, contiguous within a session
    pub turn_number: u32,

    pub status: TurnStatus,

    /// When the user stopped speaking (seconds)
    pub start_timestamp: f64,

    /// When the bot started speaking; absent for open and partial turns
    pub end_timestamp: Option<f64>,

    /// Latencies, in seconds. The first figure reported in a turn is kept:
    /// later ones come from retries or follow-up chunks of the same stage.
    pub stt_latency: Option<f64>,
    pub turn_detection_latency: Option<f64>,
    pub llm_latency: Option<f64>,
    pub tts_latency: Option<f64>,

    /// Usage counters, summed across measurements
    pub llm_prompt_tokens: Option<u64>,
    pub llm_completion_tokens: Option<u64>,
    pub tts_characters: Option<u64>,
}

impl Turn {
    /// Open a new turn
    pub fn open(turn_number: u32, start_timestamp: f64) -> Self {
        Self {
            turn_number,
            status: TurnStatus::Open,
            start_timestamp,
            end_timestamp: None,
            stt_latency: None,
            turn_detection_latency: None,
            llm_latency: None,
            tts_latency: None,
            llm_prompt_tokens: None,
            llm_completion_tokens: None,
            tts_characters: None,
        }
    }

    /// Close normally at the bot-started-speaking time
    pub fn close(&mut self, end_timestamp: f64) {
        self.end_timestamp = Some(end_timestamp);
        self.status = TurnStatus::Complete;
    }

    /// Close without an end timestamp
    pub fn close_partial(&mut self) {
        self.end_timestamp = None;
        self.status = TurnStatus::Partial;
    }

    pub fn is_open(&self) -> bool {
        self.status == TurnStatus::Open
    }

    pub fn is_partial(&self) -> bool {
        self.status == TurnStatus::Partial
    }

    /// User-stopped to bot-started wall clock, defined only when both ends are known
    pub fn total_latency(&self) -> Option<f64> {
        self.end_timestamp.map(|end| end - self.start_timestamp)
    }

    /// Record a latency figure; the first value reported for a field wins
    ///
    /// Returns `false` if the field was already set.
    pub fn set_latency(&mut self, field: TurnField, seconds: f64) -> bool {
        let slot = match field {
            TurnField::SttLatency => &mut self.stt_latency,
            TurnField::TurnDetectionLatency => &mut self.turn_detection_latency,
            TurnField::LlmLatency => &mut self.llm_latency,
            TurnField::TtsLatency => &mut self.tts_latency,
            _ => return false,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(seconds);
        true
    }

    /// Add to a usage counter and return the new total
    pub fn add_count(&mut self, field: TurnField, amount: u64) -> Option<u64> {
        let slot = match field {
            TurnField::LlmPromptTokens => &mut self.llm_prompt_tokens,
            TurnField::LlmCompletionTokens => &mut self.llm_completion_tokens,
            TurnField::TtsCharacters => &mut self.tts_characters,
            _ => return None,
        };
        let total = slot.unwrap_or(0).saturating_add(amount);
        *slot = Some(total);
        Some(total)
    }

    pub fn latency(&self, field: TurnField) -> Option<f64> {
        match field {
            TurnField::SttLatency => self.stt_latency,
            TurnField::TurnDetectionLatency => self.turn_detection_latency,
            TurnField::LlmLatency => self.llm_latency,
            TurnField::TtsLatency => self.tts_latency,
            _ => None,
        }
    }

    pub fn count(&self, field: TurnField) -> Option<u64> {
        match field {
            TurnField::LlmPromptTokens => self.llm_prompt_tokens,
            TurnField::LlmCompletionTokens => self.llm_completion_tokens,
            TurnField::TtsCharacters => self.tts_characters,
            _ => None,
        }
    }
}
