//! Per-call observation session
//!
//! A `Session` consumes tap events one at a time. It drives the turn
//! segmenter, routes measurements into turns, emits a live line for every
//! recognized event and, on `SessionEnd` or `Cancel`, builds the final
//! report. `on_event` never fails: problems with an event are logged,
//! counted and the event is discarded.

use crate::config::ObserverConfig;
use crate::instrument::Instruments;
use crate::report::{DropCounts, SessionReport, format_latency, format_secs};
use crate::segmenter::{Attribution, Transition, TurnSegmenter};
use crate::sink::{LogSink, TracingSink};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use turnlens_core::{DropReason, Error, Event, MeasurementFields, ProducerKind, Result, Turn};
use turnlens_routing::{FieldUpdate, MetricRouter};
use uuid::Uuid;

#[cfg(feature = "metrics")]
use turnlens_observability::TurnMetrics;

/// Measurement held until the next turn opens
#[derive(Debug, Clone)]
struct PendingMeasurement {
    producer_name: String,
    kind: ProducerKind,
    fields: MeasurementFields,
}

pub struct Session {
    id: String,
    attached_at: DateTime<Utc>,
    config: ObserverConfig,
    segmenter: TurnSegmenter,
    router: MetricRouter,
    pending: VecDeque<PendingMeasurement>,
    drops: DropCounts,
    sink: Arc<dyn LogSink>,
    instruments: Instruments,
    /// Set once the session is terminal
    report: Option<SessionReport>,
}

impl Session {
    /// Create a session; fails only on invalid configuration
    pub fn new(config: ObserverConfig) -> Result<Self> {
        config.validate().map_err(Error::ConfigValidation)?;

        let router = MetricRouter::new(config.registry());
        let session = Self {
            id: Uuid::new_v4().to_string(),
            attached_at: Utc::now(),
            config,
            segmenter: TurnSegmenter::new(),
            router,
            pending: VecDeque::new(),
            drops: DropCounts::default(),
            sink: Arc::new(TracingSink),
            instruments: Instruments::default(),
            report: None,
        };

        tracing::debug!(
            session_id = %session.id,
            grace_window_secs = session.config.grace_window_secs,
            producers = session.router.registry().len(),
            "Observer session attached"
        );
        Ok(session)
    }

    /// Replace the generated session id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Send live and report lines to `sink` instead of `tracing`
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Record Prometheus metrics into `metrics`
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: Arc<TurnMetrics>) -> Self {
        self.instruments = Instruments::with_metrics(metrics);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attached_at(&self) -> DateTime<Utc> {
        self.attached_at
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Closed turns so far
    pub fn turns(&self) -> &[Turn] {
        self.segmenter.turns()
    }

    pub fn open_turn(&self) -> Option<&Turn> {
        self.segmenter.open_turn()
    }

    pub fn drops(&self) -> DropCounts {
        self.drops
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.report.is_some()
    }

    /// The final report, once the session is terminal
    pub fn report(&self) -> Option<&SessionReport> {
        self.report.as_ref()
    }

    /// Feed one event
    pub fn on_event(&mut self, event: &Event) {
        if self.is_terminal() {
            tracing::debug!(
                session_id = %self.id,
                event = event.kind_name(),
                "Ignoring event after session end"
            );
            return;
        }

        if let Err(e) = self.handle(event) {
            self.record_error(event, e);
        }
    }

    /// Finalize without a terminating event (e.g. the tap went away)
    ///
    /// Idempotent: a terminal session returns its existing report.
    pub fn finalize(&mut self, ended_at: Option<f64>) -> &SessionReport {
        let report = match self.report.take() {
            Some(report) => report,
            None => self.conclude(ended_at),
        };
        self.report.insert(report)
    }

    fn handle(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::UserStartedSpeaking { .. } => {
                let timestamp = require_timestamp(event)?;
                self.emit(format!("user started speaking at {}", format_secs(timestamp)));
                Ok(())
            }
            Event::UserStoppedSpeaking { .. } => {
                let timestamp = require_timestamp(event)?;
                self.user_stopped(timestamp)
            }
            Event::BotStartedSpeaking { .. } => {
                let timestamp = require_timestamp(event)?;
                self.bot_started(timestamp)
            }
            Event::Measurement {
                producer_name,
                producer_kind,
                fields,
                ..
            } => {
                let timestamp = require_timestamp(event)?;
                self.measurement(timestamp, producer_name, *producer_kind, fields)
            }
            Event::SessionEnd { .. } | Event::Cancel { .. } => {
                let ended_at = event.timestamp().filter(|ts| ts.is_finite());
                if ended_at.is_none() {
                    tracing::warn!(
                        session_id = %self.id,
                        event = event.kind_name(),
                        "Terminating event has no valid timestamp, finalizing anyway"
                    );
                }
                self.finalize(ended_at);
                Ok(())
            }
            Event::Other => Ok(()),
        }
    }

    fn user_stopped(&mut self, timestamp: f64) -> Result<()> {
        if let Transition::Opened {
            turn_number,
            superseded,
        } = self.segmenter.user_stopped(timestamp)
        {
            if let Some(previous) = superseded {
                self.turn_closed(previous);
                self.emit(format!(
                    "turn {} closed as partial (superseded by turn {})",
                    previous, turn_number
                ));
            }
            self.emit(format!(
                "turn {} started at {}",
                turn_number,
                format_secs(timestamp)
            ));
            self.flush_pending(turn_number);
        }

        self.segmenter.verify()
    }

    fn bot_started(&mut self, timestamp: f64) -> Result<()> {
        match self.segmenter.bot_started(timestamp) {
            Transition::Closed {
                turn_number,
                total_latency,
            } => {
                self.turn_closed(turn_number);
                self.emit(format!(
                    "turn {} complete: total={}",
                    turn_number,
                    format_secs(total_latency)
                ));
            }
            _ => {
                tracing::debug!(
                    session_id = %self.id,
                    timestamp,
                    "Bot started speaking with no open turn"
                );
                self.emit(format!(
                    "bot started speaking at {} (no open turn)",
                    format_secs(timestamp)
                ));
            }
        }

        self.segmenter.verify()
    }

    fn measurement(
        &mut self,
        timestamp: f64,
        producer_name: &str,
        producer_kind: Option<ProducerKind>,
        fields: &MeasurementFields,
    ) -> Result<()> {
        if producer_name.trim().is_empty() {
            return Err(Error::MalformedEvent(
                "measurement has no producer name".to_string(),
            ));
        }
        if fields.is_empty() {
            return Err(Error::MalformedEvent(format!(
                "measurement from '{}' carries no figures",
                producer_name
            )));
        }

        let kind = self.router.classify(producer_name, producer_kind)?;

        let routed = self
            .segmenter
            .attribution_target(timestamp, self.config.grace_window_secs)
            .map(|(turn, attribution)| {
                let updates = MetricRouter::apply(kind, fields, turn);
                (turn.turn_number, attribution, updates)
            });
        let Some((turn_number, attribution, updates)) = routed else {
            return self.hold_or_drop(timestamp, producer_name, kind, fields);
        };

        let note = match attribution {
            Attribution::Open => None,
            Attribution::Late => Some("late"),
        };
        self.report_updates(turn_number, producer_name, kind, &updates, note);
        Ok(())
    }

    fn hold_or_drop(
        &mut self,
        timestamp: f64,
        producer_name: &str,
        kind: ProducerKind,
        fields: &MeasurementFields,
    ) -> Result<()> {
        if self.pending.len() >= self.config.pending_capacity {
            return Err(Error::UnroutableMeasurement {
                producer: producer_name.to_string(),
                timestamp,
            });
        }

        tracing::debug!(
            session_id = %self.id,
            producer = producer_name,
            kind = %kind,
            timestamp,
            "No turn to attribute measurement to, holding it for the next turn"
        );
        self.pending.push_back(PendingMeasurement {
            producer_name: producer_name.to_string(),
            kind,
            fields: fields.clone(),
        });
        Ok(())
    }

    /// Apply measurements held from before `turn_number` opened
    fn flush_pending(&mut self, turn_number: u32) {
        while let Some(pending) = self.pending.pop_front() {
            let Some(turn) = self.segmenter.open_turn_mut() else {
                self.pending.push_front(pending);
                return;
            };
            let updates = MetricRouter::apply(pending.kind, &pending.fields, turn);
            self.report_updates(
                turn_number,
                &pending.producer_name,
                pending.kind,
                &updates,
                Some("buffered"),
            );
        }
    }

    fn report_updates(
        &self,
        turn_number: u32,
        producer_name: &str,
        kind: ProducerKind,
        updates: &[FieldUpdate],
        note: Option<&str>,
    ) {
        let source = match note {
            Some(note) => format!("{}, {}", producer_name, note),
            None => producer_name.to_string(),
        };

        for update in updates {
            match update {
                FieldUpdate::Latency { field, seconds } => {
                    self.emit(format!(
                        "turn {} {}={} ({})",
                        turn_number,
                        field,
                        format_latency(*field, *seconds),
                        source
                    ));
                }
                FieldUpdate::Count {
                    field,
                    added,
                    total,
                } => {
                    self.emit(format!(
                        "turn {} {}+={} total={} ({})",
                        turn_number, field, added, total, source
                    ));
                }
                // Logged by the router; the first value stays
                FieldUpdate::DuplicateLatency { .. } => {}
            }
        }

        self.instruments.measurement(kind, updates);
    }

    fn turn_closed(&self, turn_number: u32) {
        if let Some(turn) = self
            .segmenter
            .turns()
            .iter()
            .rev()
            .find(|turn| turn.turn_number == turn_number)
        {
            self.instruments.turn_closed(turn);
        }
    }

    fn conclude(&mut self, ended_at: Option<f64>) -> SessionReport {
        if let Transition::Flushed {
            partial: Some(turn_number),
        } = self.segmenter.finish()
        {
            self.turn_closed(turn_number);
            self.emit(format!(
                "turn {} closed as partial (session ended)",
                turn_number
            ));
        }

        while let Some(pending) = self.pending.pop_front() {
            tracing::debug!(
                session_id = %self.id,
                producer = %pending.producer_name,
                "Session ended with a measurement still waiting for a turn"
            );
            self.count_drop(DropReason::Unroutable);
        }

        let report = SessionReport::build(
            self.id.clone(),
            self.attached_at,
            ended_at,
            self.segmenter.turns().to_vec(),
            self.drops,
        );

        for line in report.render() {
            self.sink.emit(&line);
        }
        self.instruments.session_finished();

        tracing::info!(
            session_id = %self.id,
            turns = report.turns.len(),
            complete = report.complete_turns,
            partial = report.partial_turns,
            dropped = report.drops.total(),
            "Observer session finalized"
        );
        report
    }

    fn record_error(&mut self, event: &Event, error: Error) {
        match error.drop_reason() {
            Some(DropReason::Malformed) => {
                tracing::warn!(
                    session_id = %self.id,
                    event = event.kind_name(),
                    "Discarding event: {}",
                    error
                );
                self.count_drop(DropReason::Malformed);
            }
            Some(reason) => {
                tracing::debug!(
                    session_id = %self.id,
                    event = event.kind_name(),
                    "Discarding event: {}",
                    error
                );
                self.count_drop(reason);
            }
            None => {
                tracing::error!(
                    session_id = %self.id,
                    event = event.kind_name(),
                    "{}",
                    error
                );
            }
        }
    }

    fn count_drop(&mut self, reason: DropReason) {
        self.drops.record(reason);
        self.instruments.dropped(reason);
    }

    fn emit(&self, line: String) {
        self.sink.emit(&line);
    }
}

fn require_timestamp(event: &Event) -> Result<f64> {
    match event.timestamp() {
        Some(ts) if ts.is_finite() => Ok(ts),
        Some(ts) => Err(Error::MalformedEvent(format!(
            "{} has a non-finite timestamp ({})",
            event.kind_name(),
            ts
        ))),
        None => Err(Error::MalformedEvent(format!(
            "{} has no timestamp",
            event.kind_name()
        ))),
    }
}
