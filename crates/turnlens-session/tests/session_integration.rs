//! Integration tests for the session engine
//!
//! These drive full event sequences through a session and check the
//! resulting turns and report.

use std::sync::Arc;
use std::thread;
use turnlens_core::{Event, MeasurementFields, TurnStatus};
use turnlens_session::{
    Column, MemorySink, Observer, ObserverConfig, Session, SessionReport, SharedObserver, TapFrame,
};

fn run(events: &[Event]) -> (SessionReport, Vec<String>) {
    run_with(ObserverConfig::default(), events)
}

fn run_with(config: ObserverConfig, events: &[Event]) -> (SessionReport, Vec<String>) {
    let sink = MemorySink::new();
    let mut session = Session::new(config)
        .unwrap()
        .with_sink(Arc::new(sink.clone()));
    for event in events {
        session.on_event(event);
    }
    let report = session.report().cloned().expect("session should be terminal");
    (report, sink.lines())
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_single_turn_breakdown() {
    let events = [
        Event::user_stopped(0.0),
        Event::measurement("STTServiceX", 0.05, MeasurementFields::ttfb(0.18)),
        Event::measurement("LLMServiceY", 0.13, MeasurementFields::ttfb(0.08)),
        Event::measurement(
            "TTSServiceZ",
            0.16,
            MeasurementFields::ttfb(0.03).with_characters(24),
        ),
        Event::bot_started(1.0),
        Event::session_end(2.0),
    ];

    let (report, lines) = run(&events);

    assert_eq!(report.turns.len(), 1);
    assert_eq!(report.complete_turns, 1);
    let turn = report.turn(1).unwrap();
    assert_eq!(turn.status, TurnStatus::Complete);
    assert!(approx(turn.total_latency().unwrap(), 1.0));
    assert_eq!(turn.stt_latency, Some(0.18));
    assert_eq!(turn.llm_latency, Some(0.08));
    assert_eq!(turn.tts_latency, Some(0.03));
    assert_eq!(turn.tts_characters, Some(24));
    assert_eq!(turn.turn_detection_latency, None);

    assert_eq!(
        report.columns,
        vec![
            Column::Turn,
            Column::Total,
            Column::SttTtfb,
            Column::LlmTtfb,
            Column::TtsTtfb,
            Column::TtsChars
        ]
    );

    let text = lines.join("\n");
    assert!(text.contains("1.000s"));
    assert!(text.contains("0.180s"));
    assert!(text.contains("0.080s"));
    assert!(text.contains("0.030s"));
    assert!(text.contains("24"));
}

#[test]
fn test_superseded_turn_then_normal_turn() {
    let events = [
        Event::user_stopped(0.0),
        Event::user_stopped(1.5),
        Event::bot_started(2.0),
        Event::session_end(3.0),
    ];

    let (report, lines) = run(&events);

    assert_eq!(report.turns.len(), 2);
    let first = report.turn(1).unwrap();
    assert_eq!(first.status, TurnStatus::Partial);
    assert_eq!(first.end_timestamp, None);

    let second = report.turn(2).unwrap();
    assert_eq!(second.status, TurnStatus::Complete);
    assert!(approx(second.total_latency().unwrap(), 0.5));

    assert!(lines.contains(&"turn 1 closed as partial (superseded by turn 2)".to_string()));
    assert!(lines.iter().any(|l| l.starts_with("1*")));
}

#[test]
fn test_n_pairs_produce_n_turns() {
    let mut events = Vec::new();
    for i in 0..25 {
        let start = i as f64 * 10.0;
        events.push(Event::user_stopped(start));
        events.push(Event::bot_started(start + 0.5 + i as f64 * 0.01));
    }
    events.push(Event::session_end(500.0));

    let (report, _) = run(&events);

    assert_eq!(report.turns.len(), 25);
    assert_eq!(report.complete_turns, 25);
    for (index, turn) in report.turns.iter().enumerate() {
        assert_eq!(turn.turn_number, index as u32 + 1);
        assert_eq!(turn.status, TurnStatus::Complete);
    }
    let stats = report.total_latency.unwrap();
    assert!(approx(stats.min, 0.5));
    assert!(approx(stats.max, 0.74));
}

#[test]
fn test_tts_characters_are_summed() {
    let events = [
        Event::user_stopped(0.0),
        Event::measurement("CartesiaTTSService", 0.2, MeasurementFields::characters(5)),
        Event::measurement("CartesiaTTSService", 0.4, MeasurementFields::characters(7)),
        Event::bot_started(1.0),
        Event::session_end(2.0),
    ];

    let (report, _) = run(&events);
    assert_eq!(report.turn(1).unwrap().tts_characters, Some(12));
    assert_eq!(report.usage.tts_characters, 12);
}

#[test]
fn test_huge_character_counts_saturate_session_usage() {
    let events = [
        Event::user_stopped(0.0),
        Event::measurement("ElevenLabsTTS#0", 0.2, MeasurementFields::characters(u64::MAX - 1)),
        Event::bot_started(1.0),
        Event::user_stopped(2.0),
        Event::measurement("ElevenLabsTTS#0", 2.2, MeasurementFields::characters(10)),
        Event::bot_started(3.0),
        Event::session_end(4.0),
    ];

    let (report, _) = run(&events);
    assert_eq!(report.turn(1).unwrap().tts_characters, Some(u64::MAX - 1));
    assert_eq!(report.turn(2).unwrap().tts_characters, Some(10));
    assert_eq!(report.usage.tts_characters, u64::MAX);
}

#[test]
fn test_suffix_named_tts_producer_routes_to_tts() {
    let events = [
        Event::user_stopped(0.0),
        Event::measurement(
            "AWSTTS_1",
            0.3,
            MeasurementFields::ttfb(0.05).with_characters(18),
        ),
        Event::bot_started(1.0),
        Event::session_end(2.0),
    ];

    let (report, _) = run(&events);
    let turn = report.turn(1).unwrap();
    assert_eq!(turn.tts_latency, Some(0.05));
    assert_eq!(turn.tts_characters, Some(18));
    assert_eq!(turn.stt_latency, None);
}

#[test]
fn test_llm_tokens_are_summed() {
    let events = [
        Event::user_stopped(0.0),
        Event::measurement("OpenAILLMService", 0.1, MeasurementFields::llm_usage(100, 20)),
        Event::measurement("OpenAILLMService", 0.3, MeasurementFields::llm_usage(150, 30)),
        Event::bot_started(1.0),
        Event::session_end(2.0),
    ];

    let (report, lines) = run(&events);
    let turn = report.turn(1).unwrap();
    assert_eq!(turn.llm_prompt_tokens, Some(250));
    assert_eq!(turn.llm_completion_tokens, Some(50));
    assert!(lines.iter().any(|l| l.contains("250/50")));
}

#[test]
fn test_partial_turn_at_end_is_reported_but_not_averaged() {
    let events = [
        Event::user_stopped(0.0),
        Event::measurement("DeepgramSTTService", 0.1, MeasurementFields::ttfb(0.2)),
        Event::bot_started(1.0),
        Event::user_stopped(5.0),
        Event::measurement("DeepgramSTTService", 5.1, MeasurementFields::ttfb(0.9)),
        Event::session_end(6.0),
    ];

    let (report, lines) = run(&events);

    assert_eq!(report.turns.len(), 2);
    assert_eq!(report.partial_turns, 1);
    assert_eq!(report.turn(2).unwrap().status, TurnStatus::Partial);
    assert_eq!(report.turn(2).unwrap().stt_latency, Some(0.9));

    let total = report.total_latency.unwrap();
    assert_eq!(total.count, 1);
    assert!(approx(total.avg, 1.0));

    let stt = report.field_latency[&turnlens_core::TurnField::SttLatency];
    assert_eq!(stt.count, 1);
    assert!(approx(stt.avg, 0.2));

    assert!(lines.iter().any(|l| l.starts_with("2*")));
    assert!(lines.contains(&"* partial turn, excluded from averages".to_string()));
}

#[test]
fn test_unknown_producers_never_reach_the_report() {
    let events = [
        Event::user_stopped(0.0),
        Event::measurement("AudioBufferProcessor", 0.1, MeasurementFields::ttfb(0.4)),
        Event::measurement("RTVIProcessor", 0.2, MeasurementFields::characters(99)),
        Event::bot_started(1.0),
        Event::session_end(2.0),
    ];

    let (report, _) = run(&events);

    assert_eq!(report.drops.unknown_producer, 2);
    let turn = report.turn(1).unwrap();
    assert_eq!(turn.stt_latency, None);
    assert_eq!(turn.tts_characters, None);
    assert_eq!(report.columns, vec![Column::Turn, Column::Total]);
}

#[test]
fn test_bot_greeting_creates_no_turn() {
    let events = [
        Event::bot_started(0.2),
        Event::measurement("ElevenLabsTTSService", 0.25, MeasurementFields::characters(40)),
        Event::user_stopped(3.0),
        Event::bot_started(4.0),
        Event::session_end(5.0),
    ];

    let (report, _) = run(&events);
    assert_eq!(report.turns.len(), 1);
    assert_eq!(report.turns[0].turn_number, 1);
    assert_eq!(report.drops.unroutable, 1);
}

#[test]
fn test_late_measurement_within_grace_window() {
    let config = ObserverConfig {
        grace_window_secs: 2.0,
        ..ObserverConfig::default()
    };
    let events = [
        Event::user_stopped(0.0),
        Event::bot_started(1.0),
        Event::measurement("OpenAILLMService", 1.5, MeasurementFields::llm_usage(80, 12)),
        Event::measurement("OpenAILLMService", 3.5, MeasurementFields::llm_usage(1, 1)),
        Event::session_end(4.0),
    ];

    let (report, lines) = run_with(config, &events);

    let turn = report.turn(1).unwrap();
    assert_eq!(turn.llm_prompt_tokens, Some(80));
    assert_eq!(turn.llm_completion_tokens, Some(12));
    assert_eq!(report.drops.unroutable, 1);
    assert!(lines.iter().any(|l| l.ends_with("(OpenAILLMService, late)")));
}

#[test]
fn test_turn_detector_reports_end_to_end_time() {
    let events = [
        Event::user_stopped(0.0),
        Event::measurement(
            "LocalSmartTurnAnalyzerV3",
            0.01,
            MeasurementFields::turn_detection(250.0).with_inference_ms(40.0),
        ),
        Event::bot_started(1.0),
        Event::session_end(2.0),
    ];

    let (report, lines) = run(&events);
    assert_eq!(report.turn(1).unwrap().turn_detection_latency, Some(0.25));
    assert!(report.has_column(Column::TurnDetect));
    assert!(lines.iter().any(|l| l.contains("250ms")));
}

#[test]
fn test_incomplete_turn_detector_verdict_is_not_attributed() {
    let events = [
        Event::user_stopped(0.0),
        Event::measurement(
            "LocalSmartTurnAnalyzerV3",
            0.01,
            MeasurementFields::turn_detection(300.0).with_complete(false),
        ),
        Event::bot_started(1.0),
        Event::session_end(2.0),
    ];

    let (report, _) = run(&events);
    assert_eq!(report.turn(1).unwrap().turn_detection_latency, None);
    assert!(!report.has_column(Column::TurnDetect));
}

#[test]
fn test_replayed_frames_through_observer() {
    let frames = [
        r#"{"id":1,"type":"user_stopped_speaking","timestamp":0.0}"#,
        r#"{"id":1,"type":"user_stopped_speaking","timestamp":0.0}"#,
        r#"{"id":2,"type":"measurement","timestamp":0.05,"producer_name":"STTServiceX","ttfb_seconds":0.18}"#,
        r#"{"id":3,"direction":"upstream","type":"bot_started_speaking","timestamp":0.5}"#,
        r#"{"id":4,"type":"input_audio_raw"}"#,
        r#"{"id":5,"type":"bot_started_speaking","timestamp":1.0}"#,
        r#"{"id":6,"type":"end_frame_placeholder"}"#,
        r#"{"id":7,"type":"session_end","timestamp":2.0}"#,
    ];

    let mut observer = Observer::new(ObserverConfig::default()).unwrap();
    for line in frames {
        let frame: TapFrame = serde_json::from_str(line).unwrap();
        observer.on_frame(&frame);
    }

    let report = observer.session().report().unwrap();
    assert_eq!(report.turns.len(), 1);
    assert!(approx(report.turns[0].total_latency().unwrap(), 1.0));
    assert_eq!(report.turns[0].stt_latency, Some(0.18));
}

#[test]
fn test_shared_observer_across_threads() {
    let shared = SharedObserver::new(Observer::new(ObserverConfig::default()).unwrap());
    shared.on_event(&Event::user_stopped(0.0));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let shared = shared.clone();
            thread::spawn(move || {
                for j in 0..25 {
                    shared.on_event(&Event::measurement(
                        "CartesiaTTSService",
                        0.1 + (i * 25 + j) as f64 * 0.001,
                        MeasurementFields::characters(1),
                    ));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    shared.on_event(&Event::bot_started(1.0));
    shared.on_event(&Event::session_end(2.0));

    let report = shared.report().unwrap();
    assert_eq!(report.turn(1).unwrap().tts_characters, Some(100));
}

#[test]
fn test_report_json_round_trip() {
    let events = [
        Event::user_stopped(0.0),
        Event::measurement("STTServiceX", 0.05, MeasurementFields::ttfb(0.18)),
        Event::bot_started(1.0),
        Event::session_end(2.0),
    ];
    let (report, _) = run(&events);

    let json = serde_json::to_string(&report).unwrap();
    let decoded: SessionReport = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, report);
}
