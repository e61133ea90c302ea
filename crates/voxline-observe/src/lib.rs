//! Metrics collection for the Voxline voice assistant.
//!
//! The LLM, speech recognition and speech synthesis clients each report a
//! metric event when a request completes. This crate subscribes to those
//! events, normalizes them into one flat row schema, and keeps a CSV file
//! with every row seen since startup.
//!
//! # Pipeline
//!
//! | Stage | Module | Role |
//! |-------|--------|------|
//! | Wiring | `wiring` | registers one handler per client channel |
//! | Queue | `pipeline` | handlers enqueue; one consumer task does the work |
//! | Formatter | `format` | one summary log line per event |
//! | Normalizer | `record` | rename, round, stamp |
//! | Store | `store` | append in memory, rewrite the CSV file |
//!
//! # Usage
//!
//! ```rust,ignore
//! use voxline_observe::{setup_metrics_logging, MetricsConfig, MetricsPipeline};
//!
//! let pipeline = MetricsPipeline::spawn(MetricsConfig::default().open_store());
//! setup_metrics_logging(&llm, &stt, &tts, &pipeline.handle())?;
//! // ... run the session ...
//! pipeline.shutdown().await?;
//! ```
//!
//! Nothing here is allowed to take the host process down: every failure is
//! logged and the pipeline keeps accepting events.

mod config;
mod error;
mod format;
mod pipeline;
mod record;
mod store;
mod wiring;

pub use config::MetricsConfig;
pub use error::ObserveError;
pub use format::format_metrics;
pub use pipeline::{MetricsHandle, MetricsPipeline};
pub use record::{
    column_name, format_timestamp, normalize, normalize_raw, round_millis, MetricRecord,
    RawMetricEvent, METRIC_TYPE_COLUMN, TIMESTAMP_COLUMN,
};
pub use store::{
    encode_value, render_csv, AppendOutcome, ColumnOrder, CsvFileSink, RecordSink, RecordStore,
};
pub use wiring::setup_metrics_logging;

#[cfg(test)]
mod tests;
