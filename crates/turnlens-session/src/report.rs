//! End-of-session aggregation and report rendering
//!
//! Statistics only consider turns with a recorded total latency, so partial
//! turns show up as rows but never move an average. Columns that carry no
//! data anywhere in the session are left out of the table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use turnlens_core::{DropReason, Turn, TurnField};

const PLACEHOLDER: &str = "-";
const SEPARATOR: &str = "═══════════════════════════════════════════════════════════";

/// Summary statistics over a set of latencies, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl LatencyStats {
    /// Returns `None` for an empty input
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }

        (count > 0).then(|| Self {
            count,
            avg: sum / count as f64,
            min,
            max,
        })
    }
}

/// Report table columns, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Turn,
    Total,
    SttTtfb,
    TurnDetect,
    LlmTtfb,
    TtsTtfb,
    LlmTokens,
    TtsChars,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Turn,
        Column::Total,
        Column::SttTtfb,
        Column::TurnDetect,
        Column::LlmTtfb,
        Column::TtsTtfb,
        Column::LlmTokens,
        Column::TtsChars,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Column::Turn => "Turn",
            Column::Total => "Total",
            Column::SttTtfb => "STT TTFB",
            Column::TurnDetect => "Turn Detect",
            Column::LlmTtfb => "LLM TTFB",
            Column::TtsTtfb => "TTS TTFB",
            Column::LlmTokens => "LLM Tokens",
            Column::TtsChars => "TTS Chars",
        }
    }

    /// The latency field behind a latency column
    pub fn latency_field(&self) -> Option<TurnField> {
        match self {
            Column::SttTtfb => Some(TurnField::SttLatency),
            Column::TurnDetect => Some(TurnField::TurnDetectionLatency),
            Column::LlmTtfb => Some(TurnField::LlmLatency),
            Column::TtsTtfb => Some(TurnField::TtsLatency),
            _ => None,
        }
    }

    fn has_data(&self, turn: &Turn) -> bool {
        match self {
            Column::Turn => true,
            Column::Total => turn.total_latency().is_some(),
            Column::LlmTokens => {
                turn.llm_prompt_tokens.is_some() || turn.llm_completion_tokens.is_some()
            }
            Column::TtsChars => turn.tts_characters.is_some(),
            latency => latency
                .latency_field()
                .is_some_and(|field| turn.latency(field).is_some()),
        }
    }

    fn cell(&self, turn: &Turn) -> String {
        match self {
            Column::Turn if turn.is_partial() => format!("{}*", turn.turn_number),
            Column::Turn => turn.turn_number.to_string(),
            Column::Total => turn.total_latency().map_or_else(placeholder, format_secs),
            Column::LlmTokens => format!(
                "{}/{}",
                format_count(turn.llm_prompt_tokens),
                format_count(turn.llm_completion_tokens)
            ),
            Column::TtsChars => format_count(turn.tts_characters),
            latency => match latency.latency_field() {
                Some(field) => turn
                    .latency(field)
                    .map_or_else(placeholder, |secs| format_latency(field, secs)),
                None => placeholder(),
            },
        }
    }
}

/// Events discarded during the session, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
    pub malformed: u64,
    pub unroutable: u64,
    pub unknown_producer: u64,
}

impl DropCounts {
    pub fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::Malformed => self.malformed = self.malformed.saturating_add(1),
            DropReason::Unroutable => self.unroutable = self.unroutable.saturating_add(1),
            DropReason::UnknownProducer => {
                self.unknown_producer = self.unknown_producer.saturating_add(1)
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.malformed
            .saturating_add(self.unroutable)
            .saturating_add(self.unknown_producer)
    }
}

/// Usage summed across every turn, partial ones included
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub llm_prompt_tokens: u64,
    pub llm_completion_tokens: u64,
    pub tts_characters: u64,
}

impl UsageTotals {
    fn from_turns(turns: &[Turn]) -> Self {
        turns.iter().fold(Self::default(), |mut totals, turn| {
            totals.llm_prompt_tokens = totals
                .llm_prompt_tokens
                .saturating_add(turn.llm_prompt_tokens.unwrap_or(0));
            totals.llm_completion_tokens = totals
                .llm_completion_tokens
                .saturating_add(turn.llm_completion_tokens.unwrap_or(0));
            totals.tts_characters = totals
                .tts_characters
                .saturating_add(turn.tts_characters.unwrap_or(0));
            totals
        })
    }
}

/// Final report of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub attached_at: DateTime<Utc>,
    /// Pipeline timestamp of the terminating event, when it carried one
    pub ended_at: Option<f64>,

    /// Every closed turn, in turn order
    pub turns: Vec<Turn>,
    pub complete_turns: usize,
    pub partial_turns: usize,

    /// Statistics over complete turns only
    pub total_latency: Option<LatencyStats>,
    pub field_latency: BTreeMap<TurnField, LatencyStats>,

    /// Columns that have data somewhere in the session
    pub columns: Vec<Column>,
    pub usage: UsageTotals,
    pub drops: DropCounts,
}

impl SessionReport {
    pub fn build(
        session_id: impl Into<String>,
        attached_at: DateTime<Utc>,
        ended_at: Option<f64>,
        mut turns: Vec<Turn>,
        drops: DropCounts,
    ) -> Self {
        turns.sort_by_key(|turn| turn.turn_number);

        let timed: Vec<&Turn> = turns
            .iter()
            .filter(|turn| turn.total_latency().is_some())
            .collect();

        let total_latency =
            LatencyStats::from_values(timed.iter().filter_map(|turn| turn.total_latency()));

        let field_latency = TurnField::LATENCIES
            .iter()
            .filter_map(|&field| {
                LatencyStats::from_values(timed.iter().filter_map(|turn| turn.latency(field)))
                    .map(|stats| (field, stats))
            })
            .collect();

        let columns = Column::ALL
            .iter()
            .copied()
            .filter(|column| {
                *column == Column::Turn || turns.iter().any(|turn| column.has_data(turn))
            })
            .collect();

        Self {
            session_id: session_id.into(),
            attached_at,
            ended_at,
            complete_turns: timed.len(),
            partial_turns: turns.iter().filter(|turn| turn.is_partial()).count(),
            usage: UsageTotals::from_turns(&turns),
            turns,
            total_latency,
            field_latency,
            columns,
            drops,
        }
    }

    pub fn turn(&self, turn_number: u32) -> Option<&Turn> {
        self.turns.iter().find(|turn| turn.turn_number == turn_number)
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    fn average_cell(&self, column: Column) -> String {
        let stats = match column {
            Column::Turn => return "Avg".to_string(),
            Column::Total => self.total_latency,
            Column::LlmTokens | Column::TtsChars => return String::new(),
            latency => latency
                .latency_field()
                .and_then(|field| self.field_latency.get(&field).copied()),
        };

        match (stats, column.latency_field()) {
            (Some(stats), Some(field)) => format_latency(field, stats.avg),
            (Some(stats), None) => format_secs(stats.avg),
            (None, _) => placeholder(),
        }
    }

    /// Render the report as text lines
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![
            SEPARATOR.to_string(),
            format!("Session {} turn summary", self.session_id),
            SEPARATOR.to_string(),
        ];

        if self.turns.is_empty() {
            lines.push("no turns recorded".to_string());
            self.render_drops(&mut lines);
            lines.push(SEPARATOR.to_string());
            return lines;
        }

        let mut rows: Vec<Vec<String>> = Vec::with_capacity(self.turns.len() + 2);
        rows.push(self.columns.iter().map(|c| c.header().to_string()).collect());
        for turn in &self.turns {
            rows.push(self.columns.iter().map(|c| c.cell(turn)).collect());
        }
        let average_row: Vec<String> = self.columns.iter().map(|c| self.average_cell(*c)).collect();

        let widths: Vec<usize> = (0..self.columns.len())
            .map(|i| {
                rows.iter()
                    .chain(std::iter::once(&average_row))
                    .map(|row| row[i].chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let format_row = |row: &[String]| {
            row.iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };
        let rule = widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-");

        let mut rows = rows.into_iter();
        if let Some(header) = rows.next() {
            lines.push(format_row(&header));
            lines.push(rule.clone());
        }
        lines.extend(rows.map(|row| format_row(&row)));
        lines.push(rule);
        lines.push(format_row(&average_row));
        lines.push(String::new());

        lines.push(format!(
            "Turns: {} ({} complete, {} partial)",
            self.turns.len(),
            self.complete_turns,
            self.partial_turns
        ));
        if self.partial_turns > 0 {
            lines.push("* partial turn, excluded from averages".to_string());
        }
        if let Some(stats) = self.total_latency {
            lines.push(format!(
                "Total latency: min={} avg={} max={}",
                format_secs(stats.min),
                format_secs(stats.avg),
                format_secs(stats.max)
            ));
        }
        if self.usage != UsageTotals::default() {
            lines.push(format!(
                "Usage: {} prompt tokens, {} completion tokens, {} TTS characters",
                self.usage.llm_prompt_tokens,
                self.usage.llm_completion_tokens,
                self.usage.tts_characters
            ));
        }
        self.render_drops(&mut lines);
        lines.push(SEPARATOR.to_string());
        lines
    }

    fn render_drops(&self, lines: &mut Vec<String>) {
        if self.drops.total() > 0 {
            lines.push(format!(
                "Dropped events: {} malformed, {} unroutable, {} unknown producer",
                self.drops.malformed, self.drops.unroutable, self.drops.unknown_producer
            ));
        }
    }
}

fn placeholder() -> String {
    PLACEHOLDER.to_string()
}

/// Seconds with millisecond precision
pub fn format_secs(seconds: f64) -> String {
    format!("{:.3}s", seconds)
}

/// Whole milliseconds
pub fn format_ms(seconds: f64) -> String {
    format!("{:.0}ms", seconds * 1000.0)
}

/// Turn detection is reported in ms, every other stage in seconds
pub fn format_latency(field: TurnField, seconds: f64) -> String {
    match field {
        TurnField::TurnDetectionLatency => format_ms(seconds),
        _ => format_secs(seconds),
    }
}

fn format_count(count: Option<u64>) -> String {
    count.map_or_else(placeholder, |count| count.to_string())
}
