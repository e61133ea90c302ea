//! Unit tests for the metrics pipeline.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use serde_json::json;
use voxline_types::{
    EouMetrics, FieldValue, LlmMetrics, MetricEvent, MetricKind, MetricsHandler, MetricsSource,
    SttMetrics, SubscribeError, TtsMetrics, EOU_METRICS_COLLECTED, METRICS_COLLECTED,
};

use crate::error::ObserveError;
use crate::format::format_metrics;
use crate::pipeline::MetricsPipeline;
use crate::record::{column_name, normalize, normalize_raw, round_millis, RawMetricEvent};
use crate::store::{AppendOutcome, CsvFileSink, RecordSink, RecordStore};
use crate::wiring::setup_metrics_logging;

fn llm(request_id: &str) -> MetricEvent {
    MetricEvent::Llm(LlmMetrics {
        request_id: request_id.to_string(),
        ttft: 0.41234,
        duration: 1.23456,
        prompt_tokens: 42,
        completion_tokens: 17,
        tokens_per_second: 13.7702,
    })
}

fn stt() -> MetricEvent {
    MetricEvent::Stt(SttMetrics {
        duration: 0.0504,
        audio_duration: 2.5,
        streamed: true,
    })
}

fn eou() -> MetricEvent {
    MetricEvent::Eou(EouMetrics {
        end_of_utterance_delay: 0.5126,
        transcription_delay: 0.3339,
    })
}

fn tts(request_id: &str) -> MetricEvent {
    MetricEvent::Tts(TtsMetrics {
        request_id: request_id.to_string(),
        ttfb: 0.1234,
        duration: 0.8,
        audio_duration: 3.0,
        streamed: false,
    })
}

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
}

/// Sink that records every write and can be told to fail the next one.
#[derive(Clone, Default)]
struct ScriptedSink {
    writes: Arc<Mutex<Vec<String>>>,
    fail_next: Arc<AtomicBool>,
}

impl ScriptedSink {
    fn last(&self) -> Option<String> {
        self.writes.lock().unwrap().last().cloned()
    }

    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

impl RecordSink for ScriptedSink {
    fn persist(&mut self, contents: &str) -> Result<(), ObserveError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full").into());
        }
        self.writes.lock().unwrap().push(contents.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Minimal event source with a fixed set of channels.
struct FakeSource {
    name: &'static str,
    channels: &'static [&'static str],
    handlers: Mutex<HashMap<String, Vec<MetricsHandler>>>,
}

impl FakeSource {
    fn new(name: &'static str, channels: &'static [&'static str]) -> Self {
        Self {
            name,
            channels,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    fn emit(&self, channel: &str, event: MetricEvent) {
        let handlers = self.handlers.lock().unwrap().get(channel).cloned().unwrap_or_default();
        for handler in handlers {
            handler(event.clone());
        }
    }
}

impl MetricsSource for FakeSource {
    fn source_name(&self) -> &str {
        self.name
    }

    fn on(&self, channel: &str, handler: MetricsHandler) -> Result<(), SubscribeError> {
        if !self.channels.contains(&channel) {
            return Err(SubscribeError::UnknownChannel {
                client: self.name.to_string(),
                channel: channel.to_string(),
            });
        }
        self.handlers
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }
}

fn lines(csv: &str) -> Vec<Vec<String>> {
    csv.lines()
        .map(|l| l.split(',').map(str::to_string).collect())
        .collect()
}

// ── Normalizer ───────────────────────────────────────────────────────

#[test]
fn rounds_floats_to_three_places() {
    assert_eq!(round_millis(1.23456), 1.235);
    assert_eq!(round_millis(0.1234), 0.123);
    assert!(round_millis(f64::NAN).is_nan());
    assert_eq!(round_millis(f64::INFINITY), f64::INFINITY);
}

#[test]
fn rename_table_adds_units() {
    assert_eq!(column_name("ttft"), "ttft_s");
    assert_eq!(column_name("duration"), "processing_duration_s");
    assert_eq!(column_name("audio_duration"), "audio_duration_s");
    assert_eq!(column_name("end_of_utterance_delay"), "eou_delay_s");
    assert_eq!(column_name("transcription_delay"), "transcription_delay_s");
    assert_eq!(column_name("ttfb"), "ttfb_s");
    assert_eq!(column_name("prompt_tokens"), "prompt_tokens");
    assert_eq!(column_name("streamed"), "streamed");
}

#[test]
fn normalize_stamps_and_renames() {
    let record = normalize(&llm("req-1"), MetricKind::Llm, fixed_now()).expect("should normalize");

    assert_eq!(record.timestamp, "2024-05-01T12:30:00.000000Z");
    assert_eq!(record.metric_type, MetricKind::Llm);
    assert_eq!(record.get("ttft_s"), Some(FieldValue::Float(0.412)));
    assert_eq!(record.get("processing_duration_s"), Some(FieldValue::Float(1.235)));
    assert_eq!(record.get("prompt_tokens"), Some(FieldValue::Int(42)));
    assert_eq!(record.get("tokens_per_second"), Some(FieldValue::Float(13.77)));
    assert_eq!(record.get("metric_type"), Some(FieldValue::Text("LLM".to_string())));
    assert_eq!(record.get("ttft"), None, "source names must not survive renaming");
}

#[test]
fn normalize_rejects_mismatched_kind() {
    let err = normalize(&stt(), MetricKind::Eou, fixed_now()).unwrap_err();
    match err {
        ObserveError::KindMismatch { declared, actual } => {
            assert_eq!(declared, MetricKind::Eou);
            assert_eq!(actual, MetricKind::Stt);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn normalize_raw_rejects_unknown_kind() {
    let raw = RawMetricEvent {
        kind: "VAD".to_string(),
        fields: serde_json::Map::new(),
    };
    assert!(matches!(
        normalize_raw(&raw, fixed_now()),
        Err(ObserveError::UnknownKind(_))
    ));
}

#[test]
fn normalize_raw_passes_malformed_values_through() {
    let raw: RawMetricEvent = serde_json::from_value(json!({
        "kind": "TTS",
        "fields": {
            "timestamp": 1714566600.0,
            "ttfb": "n/a",
            "duration": 0.87654,
            "audio_duration": null,
            "streamed": true,
            "characters": 120,
            "labels": ["a", "b"]
        }
    }))
    .expect("raw event should decode");

    let record = normalize_raw(&raw, fixed_now()).expect("should normalize");

    assert_eq!(record.metric_type, MetricKind::Tts);
    assert_eq!(record.timestamp, "2024-05-01T12:30:00.000000Z");
    assert_eq!(record.get("ttfb_s"), Some(FieldValue::Text("n/a".to_string())));
    assert_eq!(record.get("processing_duration_s"), Some(FieldValue::Float(0.877)));
    assert_eq!(record.get("audio_duration_s"), Some(FieldValue::Empty));
    assert_eq!(record.get("characters"), Some(FieldValue::Int(120)));
    assert_eq!(
        record.get("labels"),
        Some(FieldValue::Text(r#"["a","b"]"#.to_string()))
    );
    let names: Vec<&str> = record.fields.iter().map(|(n, _)| n.as_str()).collect();
    assert!(!names.contains(&"timestamp"), "source timestamp is replaced");
    assert_eq!(names[0], "ttfb_s", "source field order is preserved");
}

#[test]
fn normalize_raw_keeps_one_value_per_column() {
    let raw: RawMetricEvent = serde_json::from_value(json!({
        "kind": "TTS",
        "fields": { "ttfb": 0.5, "ttfb_s": 0.9, "duration": 1.25 }
    }))
    .expect("raw event should decode");

    let record = normalize_raw(&raw, fixed_now()).expect("should normalize");

    let names: Vec<&str> = record.fields.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["ttfb_s", "processing_duration_s"]);
    assert_eq!(record.get("ttfb_s"), Some(FieldValue::Float(0.5)));

    let sink = ScriptedSink::default();
    let mut store = RecordStore::new(sink.clone());
    store.append(record).unwrap();
    let rows = lines(&sink.last().unwrap());
    assert_eq!(rows[0], vec!["timestamp", "metric_type", "ttfb_s", "processing_duration_s"]);
    assert_eq!(rows[1][2..], ["0.5", "1.25"]);
}

// ── Formatter ────────────────────────────────────────────────────────

#[test]
fn formatter_summarizes_each_kind() {
    let text = format_metrics(&llm("req-1"));
    assert!(text.starts_with("LLM metrics:"));
    assert!(text.contains("Prompt tokens: 42"));
    assert!(text.contains("Tokens/s: 13.8"));
    assert!(text.contains("TTFT: 0.412s"));

    let text = format_metrics(&stt());
    assert!(text.contains("Processing: 0.050s"));
    assert!(text.contains("Audio duration: 2.500s"));
    assert!(text.contains("Streamed: yes"));

    let text = format_metrics(&eou());
    assert!(text.contains("Silence delay: 0.513s"));
    assert!(text.contains("Transcription delay: 0.334s"));

    let text = format_metrics(&tts("t-1"));
    assert!(text.contains("TTFB: 0.123s"));
    assert!(text.contains("Streamed: no"));
    assert_eq!(text.lines().count(), 5);
}

// ── Record store ─────────────────────────────────────────────────────

#[test]
fn store_header_is_union_in_first_seen_order() {
    let sink = ScriptedSink::default();
    let mut store = RecordStore::new(sink.clone());

    store.append(normalize(&stt(), MetricKind::Stt, fixed_now()).unwrap()).unwrap();
    store.append(normalize(&eou(), MetricKind::Eou, fixed_now()).unwrap()).unwrap();
    store.append(normalize(&tts("t-1"), MetricKind::Tts, fixed_now()).unwrap()).unwrap();

    let rows = lines(&sink.last().expect("file should be written"));
    assert_eq!(
        rows[0],
        vec![
            "timestamp",
            "metric_type",
            "processing_duration_s",
            "audio_duration_s",
            "streamed",
            "eou_delay_s",
            "transcription_delay_s",
            "request_id",
            "ttfb_s",
        ]
    );
    assert_eq!(rows.len(), 4);

    // STT row leaves the later columns empty.
    assert_eq!(rows[1][1], "STT");
    assert_eq!(rows[1][2], "0.05");
    assert_eq!(rows[1][3], "2.5");
    assert_eq!(rows[1][4], "true");
    assert_eq!(rows[1][5..], ["", "", "", ""]);

    // TTS row: ttfb 0.1234 persists as 0.123, whole floats keep a decimal.
    assert_eq!(rows[3][8], "0.123");
    assert_eq!(rows[3][3], "3.0");
    assert_eq!(rows[3][5], "");
}

#[test]
fn store_column_order_is_stable_for_repeated_kinds() {
    let sink = ScriptedSink::default();
    let mut store = RecordStore::new(sink.clone());

    store.append(normalize(&llm("a"), MetricKind::Llm, fixed_now()).unwrap()).unwrap();
    let first = store.columns().to_vec();
    store.append(normalize(&llm("b"), MetricKind::Llm, fixed_now()).unwrap()).unwrap();

    assert_eq!(store.columns(), first.as_slice());
    let header = &lines(&sink.last().unwrap())[0];
    assert_eq!(header.len(), first.len(), "no column may appear twice");
}

#[test]
fn store_integer_and_rounded_values_in_file() {
    let sink = ScriptedSink::default();
    let mut store = RecordStore::new(sink.clone());
    store.append(normalize(&llm("r"), MetricKind::Llm, fixed_now()).unwrap()).unwrap();

    let rows = lines(&sink.last().unwrap());
    let col = |name: &str| rows[0].iter().position(|c| c == name).unwrap();
    assert_eq!(rows[1][col("prompt_tokens")], "42");
    assert_eq!(rows[1][col("processing_duration_s")], "1.235");
    assert_eq!(rows[1][col("timestamp")], "2024-05-01T12:30:00.000000Z");
}

#[test]
fn store_keeps_record_when_write_fails_and_recovers_on_next_append() {
    let sink = ScriptedSink::default();
    let mut store = RecordStore::new(sink.clone());

    store.append(normalize(&stt(), MetricKind::Stt, fixed_now()).unwrap()).unwrap();

    sink.fail_next.store(true, Ordering::SeqCst);
    let failed = store.append(normalize(&llm("k"), MetricKind::Llm, fixed_now()).unwrap());
    assert!(matches!(failed, Err(ObserveError::Io(_))));
    assert_eq!(store.records().len(), 2, "record K must stay in memory");
    assert_eq!(store.pending(), 1);
    assert_eq!(lines(&sink.last().unwrap()).len(), 2, "file still holds the old table");

    let outcome = store
        .append(normalize(&eou(), MetricKind::Eou, fixed_now()).unwrap())
        .expect("next write succeeds");
    assert_eq!(outcome, AppendOutcome::Persisted { rows: 3 });

    let csv = sink.last().unwrap();
    assert_eq!(lines(&csv).len(), 4);
    assert!(csv.contains(",k,"), "record K is written by the next rewrite");
}

#[test]
fn store_flush_threshold_buffers_until_reached() {
    let sink = ScriptedSink::default();
    let mut store = RecordStore::new(sink.clone()).with_flush_every(3);

    let first = store.append(normalize(&stt(), MetricKind::Stt, fixed_now()).unwrap()).unwrap();
    assert_eq!(first, AppendOutcome::Buffered { pending: 1 });
    store.append(normalize(&stt(), MetricKind::Stt, fixed_now()).unwrap()).unwrap();
    assert_eq!(sink.write_count(), 0);

    let third = store.append(normalize(&stt(), MetricKind::Stt, fixed_now()).unwrap()).unwrap();
    assert_eq!(third, AppendOutcome::Persisted { rows: 3 });
    assert_eq!(sink.write_count(), 1);

    store.append(normalize(&eou(), MetricKind::Eou, fixed_now()).unwrap()).unwrap();
    store.flush().expect("forced flush");
    assert_eq!(lines(&sink.last().unwrap()).len(), 5);
    assert_eq!(store.pending(), 0);
}

#[test]
fn store_quotes_cells_with_separators() {
    let sink = ScriptedSink::default();
    let mut store = RecordStore::new(sink.clone());
    let raw: RawMetricEvent = serde_json::from_value(json!({
        "kind": "LLM",
        "fields": { "request_id": "a,\"b\"" }
    }))
    .unwrap();
    store.append(normalize_raw(&raw, fixed_now()).unwrap()).unwrap();

    let csv = sink.last().unwrap();
    assert!(csv.contains(r#""a,""b""""#), "got: {csv}");
}

#[test]
fn csv_file_sink_rewrites_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.csv");
    let mut store = RecordStore::new(CsvFileSink::new(&path));

    store.append(normalize(&stt(), MetricKind::Stt, fixed_now()).unwrap()).unwrap();
    store.append(normalize(&tts("t"), MetricKind::Tts, fixed_now()).unwrap()).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let rows = lines(&contents);
    assert_eq!(rows.len(), 3);
    assert!(rows[0].contains(&"ttfb_s".to_string()));
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp file must be renamed into place");
}

#[test]
fn csv_file_sink_reports_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = CsvFileSink::new(dir.path().join("missing").join("metrics.csv"));
    assert!(matches!(sink.persist("timestamp\n"), Err(ObserveError::Io(_))));
}

// ── Pipeline ─────────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_writes_one_row_per_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("all_metrics.csv");
    let pipeline = MetricsPipeline::spawn(RecordStore::new(CsvFileSink::new(&path)));
    let handle = pipeline.handle();

    handle.submit(MetricKind::Llm, llm("one")).unwrap();
    handle.submit(MetricKind::Stt, stt()).unwrap();
    handle.submit(MetricKind::Eou, eou()).unwrap();
    handle.submit(MetricKind::Tts, tts("two")).unwrap();
    handle.flush().await.expect("flush should succeed");

    let rows = lines(&std::fs::read_to_string(&path).unwrap());
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0][0], "timestamp");
    assert_eq!(rows[0][1], "metric_type");
    let kinds: Vec<&str> = rows[1..].iter().map(|r| r[1].as_str()).collect();
    assert_eq!(kinds, vec!["LLM", "STT", "EOU", "TTS"]);
    for row in &rows[1..] {
        chrono::DateTime::parse_from_rfc3339(&row[0]).expect("timestamp should be RFC 3339");
    }

    let store = pipeline.shutdown().await.unwrap();
    assert_eq!(store.records().len(), 4);
}

#[tokio::test]
async fn pipeline_drops_unknown_kind_without_stopping() {
    let sink = ScriptedSink::default();
    let pipeline = MetricsPipeline::spawn(RecordStore::new(sink.clone()));
    let handle = pipeline.handle();

    handle
        .submit_raw(RawMetricEvent {
            kind: "VAD".to_string(),
            fields: serde_json::Map::new(),
        })
        .unwrap();
    handle.submit(MetricKind::Tts, stt()).unwrap();
    handle.submit(MetricKind::Stt, stt()).unwrap();
    handle.flush().await.unwrap();

    let rows = lines(&sink.last().unwrap());
    assert_eq!(rows.len(), 2, "only the matching STT event becomes a row");
    assert_eq!(rows[1][1], "STT");
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn pipeline_survives_write_failure() {
    let sink = ScriptedSink::default();
    let pipeline = MetricsPipeline::spawn(RecordStore::new(sink.clone()));
    let handle = pipeline.handle();

    handle.submit(MetricKind::Stt, stt()).unwrap();
    handle.flush().await.unwrap();

    sink.fail_next.store(true, Ordering::SeqCst);
    handle.submit(MetricKind::Llm, llm("lost-then-found")).unwrap();
    handle.submit(MetricKind::Eou, eou()).unwrap();
    handle.flush().await.unwrap();

    let csv = sink.last().unwrap();
    assert_eq!(lines(&csv).len(), 4);
    assert!(csv.contains("lost-then-found"));
    pipeline.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pipeline_serializes_concurrent_submissions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.csv");
    let pipeline = MetricsPipeline::spawn(RecordStore::new(CsvFileSink::new(&path)));

    let mut tasks = Vec::new();
    for i in 0..200 {
        let handle = pipeline.handle();
        tasks.push(tokio::spawn(async move {
            let event = if i % 2 == 0 {
                llm(&format!("llm-{i}"))
            } else {
                tts(&format!("tts-{i}"))
            };
            handle.submit(event.kind(), event).unwrap();
        }));
    }
    for task in tasks {
        task.await.expect("task should not panic");
    }

    let store = pipeline.shutdown().await.unwrap();
    assert_eq!(store.records().len(), 200);

    let rows = lines(&std::fs::read_to_string(&path).unwrap());
    assert_eq!(rows.len(), 201);
    let width = rows[0].len();
    assert!(rows.iter().all(|r| r.len() == width), "no truncated rows");

    let id_col = rows[0].iter().position(|c| c == "request_id").unwrap();
    let mut ids: Vec<&str> = rows[1..].iter().map(|r| r[id_col].as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 200, "no duplicated rows");
}

#[tokio::test]
async fn shutdown_rejects_later_submissions() {
    let sink = ScriptedSink::default();
    let pipeline = MetricsPipeline::spawn(RecordStore::new(sink.clone()).with_flush_every(10));
    let handle = pipeline.handle();

    handle.submit(MetricKind::Eou, eou()).unwrap();
    let store = pipeline.shutdown().await.unwrap();
    assert_eq!(store.pending(), 0, "shutdown forces the final rewrite");
    assert_eq!(lines(&sink.last().unwrap()).len(), 2);

    assert!(matches!(
        handle.submit(MetricKind::Eou, eou()),
        Err(ObserveError::PipelineClosed)
    ));
    // The subscription callback swallows the error instead of panicking.
    (handle.handler(MetricKind::Eou))(eou());
}

// ── Wiring ───────────────────────────────────────────────────────────

#[tokio::test]
async fn wiring_routes_each_channel_to_its_kind() {
    let llm_client = FakeSource::new("llm", &[METRICS_COLLECTED]);
    let stt_client = FakeSource::new("stt", &[METRICS_COLLECTED, EOU_METRICS_COLLECTED]);
    let tts_client = FakeSource::new("tts", &[METRICS_COLLECTED]);

    let sink = ScriptedSink::default();
    let pipeline = MetricsPipeline::spawn(RecordStore::new(sink.clone()));
    let handle = pipeline.handle();

    setup_metrics_logging(&llm_client, &stt_client, &tts_client, &handle)
        .expect("wiring should succeed");

    tts_client.emit(METRICS_COLLECTED, tts("t"));
    stt_client.emit(EOU_METRICS_COLLECTED, eou());
    llm_client.emit(METRICS_COLLECTED, llm("l"));
    stt_client.emit(METRICS_COLLECTED, stt());
    // Wrong payload on a channel is rejected, not persisted.
    tts_client.emit(METRICS_COLLECTED, llm("stray"));
    handle.flush().await.unwrap();

    let rows = lines(&sink.last().unwrap());
    let kinds: Vec<&str> = rows[1..].iter().map(|r| r[1].as_str()).collect();
    assert_eq!(kinds, vec!["TTS", "EOU", "LLM", "STT"]);
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn wiring_reports_rejected_channel() {
    let llm_client = FakeSource::new("llm", &[METRICS_COLLECTED]);
    let stt_client = FakeSource::new("stt", &[METRICS_COLLECTED]);
    let tts_client = FakeSource::new("tts", &[METRICS_COLLECTED]);

    let sink = ScriptedSink::default();
    let pipeline = MetricsPipeline::spawn(RecordStore::new(sink.clone()));
    let handle = pipeline.handle();
    let err = setup_metrics_logging(&llm_client, &stt_client, &tts_client, &handle)
        .unwrap_err();

    match err {
        ObserveError::Subscribe(SubscribeError::UnknownChannel { client, channel }) => {
            assert_eq!(client, "stt");
            assert_eq!(channel, EOU_METRICS_COLLECTED);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The TTS subscription comes after the rejected one and is still live.
    tts_client.emit(METRICS_COLLECTED, tts("after-reject"));
    handle.flush().await.unwrap();
    let rows = lines(&sink.last().unwrap());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][1], "TTS");
    pipeline.shutdown().await.unwrap();
}
