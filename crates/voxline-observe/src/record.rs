//! Event normalization.
//!
//! Turns a [`MetricEvent`] (or an untyped [`RawMetricEvent`]) into a flat
//! [`MetricRecord`]: field names pass through the unit rename table, floats
//! are rounded to millisecond precision, and the record is stamped with the
//! normalization time and its kind tag.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use voxline_types::{FieldValue, MetricEvent, MetricKind};

use crate::error::ObserveError;

/// Column holding the normalization time.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Column holding the kind tag.
pub const METRIC_TYPE_COLUMN: &str = "metric_type";

/// Source field names that gain a unit suffix when persisted.
const COLUMN_UNITS: [(&str, &str); 6] = [
    ("ttft", "ttft_s"),
    ("duration", "processing_duration_s"),
    ("audio_duration", "audio_duration_s"),
    ("end_of_utterance_delay", "eou_delay_s"),
    ("transcription_delay", "transcription_delay_s"),
    ("ttfb", "ttfb_s"),
];

/// A normalized metric row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    /// RFC 3339 UTC timestamp assigned at normalization.
    pub timestamp: String,
    /// The kind tag of the source event.
    pub metric_type: MetricKind,
    /// Renamed fields in source order.
    pub fields: Vec<(String, FieldValue)>,
}

impl MetricRecord {
    /// Returns the value for `column`, including the two fixed columns.
    pub fn get(&self, column: &str) -> Option<FieldValue> {
        match column {
            TIMESTAMP_COLUMN => Some(FieldValue::Text(self.timestamp.clone())),
            METRIC_TYPE_COLUMN => Some(FieldValue::Text(self.metric_type.as_str().to_string())),
            _ => self
                .fields
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, value)| value.clone()),
        }
    }
}

/// An event whose kind tag has not been validated yet.
///
/// Used for events that arrive as JSON rather than as a typed
/// [`MetricEvent`], for example from an out-of-process voice worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetricEvent {
    /// The claimed kind tag (`LLM`, `STT`, `EOU` or `TTS`).
    pub kind: String,
    /// Field name to value.
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

/// Maps a source field name to its persisted column name.
pub fn column_name(field: &str) -> &str {
    COLUMN_UNITS
        .iter()
        .find(|(source, _)| *source == field)
        .map_or(field, |(_, column)| column)
}

/// Rounds to three decimal places, half away from zero.
///
/// Non-finite values are returned unchanged.
pub fn round_millis(value: f64) -> f64 {
    let scaled = value * 1000.0;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / 1000.0
}

fn round_value(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Float(v) => FieldValue::Float(round_millis(v)),
        other => other,
    }
}

/// Formats `now` the way every record timestamp is written.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Normalizes a typed event that arrived on a channel declared for `declared`.
///
/// # Errors
///
/// Returns `ObserveError::KindMismatch` if the event's variant is not
/// `declared`.
pub fn normalize(
    event: &MetricEvent,
    declared: MetricKind,
    now: DateTime<Utc>,
) -> Result<MetricRecord, ObserveError> {
    let actual = event.kind();
    if actual != declared {
        return Err(ObserveError::KindMismatch { declared, actual });
    }

    let fields = event
        .fields()
        .into_iter()
        .map(|(name, value)| (column_name(name).to_string(), round_value(value)))
        .collect();

    Ok(MetricRecord {
        timestamp: format_timestamp(now),
        metric_type: declared,
        fields,
    })
}

/// Normalizes an untyped event.
///
/// Values that are not plain numbers or booleans are carried through as
/// text instead of failing the record. Source fields named `timestamp` or
/// `metric_type` are replaced by the stamped values.
///
/// When two source fields map to the same column (`ttfb` and `ttfb_s`), the
/// first in source order is kept and the other is dropped with a warning.
///
/// # Errors
///
/// Returns `ObserveError::UnknownKind` if `raw.kind` is not a known tag.
pub fn normalize_raw(raw: &RawMetricEvent, now: DateTime<Utc>) -> Result<MetricRecord, ObserveError> {
    let kind: MetricKind = raw.kind.parse()?;

    let mut fields: Vec<(String, FieldValue)> = Vec::with_capacity(raw.fields.len());
    for (name, value) in &raw.fields {
        if name == TIMESTAMP_COLUMN || name == METRIC_TYPE_COLUMN {
            continue;
        }
        let column = column_name(name);
        if fields.iter().any(|(existing, _)| existing == column) {
            tracing::warn!(
                metric_type = kind.as_str(),
                field = %name,
                column,
                "dropping metrics field that duplicates an earlier column"
            );
            continue;
        }
        fields.push((column.to_string(), json_field(value)));
    }

    Ok(MetricRecord {
        timestamp: format_timestamp(now),
        metric_type: kind,
        fields,
    })
}

fn json_field(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Empty,
        Value::Bool(b) => FieldValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                FieldValue::Int(i)
            } else if n.is_u64() {
                // Out of i64 range; keep the digits as written.
                FieldValue::Text(n.to_string())
            } else {
                n.as_f64()
                    .map_or_else(|| FieldValue::Text(n.to_string()), |f| FieldValue::Float(round_millis(f)))
            }
        }
        Value::String(s) => FieldValue::Text(s.clone()),
        nested => FieldValue::Text(nested.to_string()),
    }
}
