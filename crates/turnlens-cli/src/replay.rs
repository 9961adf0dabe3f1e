//! Replay recorded tap frames through an observer session
//!
//! Input is JSON Lines, one `TapFrame` per line. Blank lines are skipped;
//! lines that do not parse are logged and skipped.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use turnlens_observability::TurnMetrics;
use turnlens_session::{LogSink, Observer, ObserverConfig, Session, SessionReport, TapFrame};

/// Prints lines to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn emit(&self, line: &str) {
        println!("{}", line);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: usize,
    pub frames: usize,
    pub delivered: usize,
    pub unparseable: usize,
}

pub struct ReplayOutcome {
    pub report: SessionReport,
    pub stats: ReplayStats,
}

/// Feed every frame from `reader` to `observer`, then finalize
pub async fn replay_reader<R>(reader: R, mut observer: Observer) -> Result<ReplayOutcome>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await.context("Failed to read event stream")? {
        stats.lines += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<TapFrame>(line) {
            Ok(frame) => {
                stats.frames += 1;
                if observer.on_frame(&frame) {
                    stats.delivered += 1;
                }
            }
            Err(e) => {
                stats.unparseable += 1;
                tracing::warn!(line = stats.lines, "Skipping unparseable frame: {}", e);
            }
        }
    }

    if !observer.session().is_terminal() {
        tracing::info!("Event stream ended without session_end, finalizing");
    }
    let report = observer.finalize(None).clone();

    tracing::debug!(
        lines = stats.lines,
        frames = stats.frames,
        delivered = stats.delivered,
        unparseable = stats.unparseable,
        "Replay finished"
    );
    Ok(ReplayOutcome { report, stats })
}

/// Replay a JSON Lines file
///
/// In text mode live lines and the rendered report go to stdout; in JSON mode
/// live lines go to the log and the caller prints the report.
pub async fn replay_file(
    path: &Path,
    config: ObserverConfig,
    text_output: bool,
    metrics: Option<Arc<TurnMetrics>>,
) -> Result<ReplayOutcome> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut session = Session::new(config).context("Invalid observer configuration")?;
    if text_output {
        session = session.with_sink(Arc::new(StdoutSink));
    }
    if let Some(metrics) = metrics {
        session = session.with_metrics(metrics);
    }

    tracing::info!(session_id = %session.id(), path = %path.display(), "Replaying tap frames");
    replay_reader(BufReader::new(file), Observer::with_session(session)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use turnlens_session::MemorySink;

    const RECORDING: &str = r#"
{"id":1,"type":"user_stopped_speaking","timestamp":0.0}
{"id":1,"type":"user_stopped_speaking","timestamp":0.0}
{"id":2,"type":"measurement","timestamp":0.05,"producer_name":"STTServiceX","ttfb_seconds":0.18}
not json
{"id":3,"type":"measurement","timestamp":0.16,"producer_name":"TTSServiceZ","ttfb_seconds":0.03,"character_count":24}
{"id":4,"type":"bot_started_speaking","timestamp":1.0}
{"id":5,"type":"session_end","timestamp":2.0}
"#;

    fn observer() -> Observer {
        let session = Session::new(ObserverConfig::default())
            .unwrap()
            .with_sink(Arc::new(MemorySink::new()));
        Observer::with_session(session)
    }

    #[tokio::test]
    async fn test_replay_reader() {
        let outcome = replay_reader(RECORDING.as_bytes(), observer()).await.unwrap();

        assert_eq!(outcome.stats.frames, 6);
        assert_eq!(outcome.stats.delivered, 5);
        assert_eq!(outcome.stats.unparseable, 1);

        let turn = outcome.report.turn(1).unwrap();
        assert_eq!(turn.stt_latency, Some(0.18));
        assert_eq!(turn.tts_characters, Some(24));
        assert_eq!(outcome.report.ended_at, Some(2.0));
    }

    #[tokio::test]
    async fn test_replay_without_session_end() {
        let input = "{\"type\":\"user_stopped_speaking\",\"timestamp\":0.0}\n";
        let outcome = replay_reader(input.as_bytes(), observer()).await.unwrap();

        assert_eq!(outcome.report.partial_turns, 1);
        assert_eq!(outcome.report.ended_at, None);
    }

    #[tokio::test]
    async fn test_replay_file_records_metrics() {
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        file.write_all(RECORDING.as_bytes()).unwrap();

        let metrics = Arc::new(TurnMetrics::new().unwrap());
        let outcome = replay_file(
            file.path(),
            ObserverConfig::default(),
            false,
            Some(metrics.clone()),
        )
        .await
        .unwrap();

        assert_eq!(outcome.report.complete_turns, 1);
        assert_eq!(metrics.turns_total.with_label_values(&["complete"]).get(), 1.0);
        assert_eq!(metrics.tts_characters_total.get(), 24.0);
        assert_eq!(metrics.sessions_total.get(), 1.0);
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let result = replay_file(
            Path::new("/nonexistent/events.jsonl"),
            ObserverConfig::default(),
            false,
            None,
        )
        .await;
        assert!(result.is_err());
    }
}
