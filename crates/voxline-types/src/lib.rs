//! Shared types for the Voxline voice assistant.
//!
//! This crate defines the metric events emitted by the speech and language
//! service clients and the subscription seam ([`MetricsSource`]) through
//! which the metrics pipeline attaches to them.
//!
//! Nothing in here performs I/O. Service clients (`voxline-voice`) produce
//! [`MetricEvent`] values; the observability pipeline (`voxline-observe`)
//! consumes them. Keeping the shared vocabulary here avoids a dependency
//! between those two crates.

pub mod metrics;
pub mod source;

pub use metrics::{
    EouMetrics, FieldValue, LlmMetrics, MetricEvent, MetricKind, ParseMetricKindError,
    SttMetrics, TtsMetrics,
};
pub use source::{
    MetricsHandler, MetricsSource, SubscribeError, EOU_METRICS_COLLECTED, METRICS_COLLECTED,
};
