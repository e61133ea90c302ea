//! Metric event definitions.
//!
//! Every service client reports one event per completed unit of work: an LLM
//! completion, a transcription, an end-of-utterance decision, or a synthesis.
//! Each kind carries its own fixed set of fields; [`MetricEvent::fields`]
//! flattens them into named [`FieldValue`]s for persistence.

use serde::{Deserialize, Serialize};

/// The four metric kinds reported by the voice pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Language model completion.
    #[serde(rename = "LLM")]
    Llm,
    /// Speech-to-text transcription.
    #[serde(rename = "STT")]
    Stt,
    /// End-of-utterance detection.
    #[serde(rename = "EOU")]
    Eou,
    /// Text-to-speech synthesis.
    #[serde(rename = "TTS")]
    Tts,
}

impl MetricKind {
    /// All kinds, in the order the pipeline documents them.
    pub const ALL: [MetricKind; 4] = [Self::Llm, Self::Stt, Self::Eou, Self::Tts];

    /// Returns the canonical tag persisted in the `metric_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "LLM",
            Self::Stt => "STT",
            Self::Eou => "EOU",
            Self::Tts => "TTS",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = ParseMetricKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LLM" => Ok(Self::Llm),
            "STT" => Ok(Self::Stt),
            "EOU" => Ok(Self::Eou),
            "TTS" => Ok(Self::Tts),
            _ => Err(ParseMetricKindError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown metric kind tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMetricKindError(pub String);

impl std::fmt::Display for ParseMetricKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown metric kind: {}", self.0)
    }
}

impl std::error::Error for ParseMetricKindError {}

/// A single named value extracted from a metric event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// No value. Written as an empty cell.
    Empty,
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Metrics for one language model completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMetrics {
    /// Identifier of the completion request.
    pub request_id: String,
    /// Time to first token, in seconds.
    pub ttft: f64,
    /// Total request duration, in seconds.
    pub duration: f64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub tokens_per_second: f64,
}

/// Metrics for one speech-to-text transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttMetrics {
    /// Processing time, in seconds.
    pub duration: f64,
    /// Length of the transcribed audio, in seconds.
    pub audio_duration: f64,
    /// Whether the recognizer ran in streaming mode.
    pub streamed: bool,
}

/// Metrics for one end-of-utterance decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EouMetrics {
    /// Silence between the end of speech and the turn being committed, in seconds.
    pub end_of_utterance_delay: f64,
    /// Time between the end of speech and the final transcript, in seconds.
    pub transcription_delay: f64,
}

/// Metrics for one text-to-speech synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsMetrics {
    /// Identifier of the synthesis request.
    pub request_id: String,
    /// Time to first audio byte, in seconds.
    pub ttfb: f64,
    /// Total synthesis duration, in seconds.
    pub duration: f64,
    /// Length of the produced audio, in seconds.
    pub audio_duration: f64,
    pub streamed: bool,
}

/// A metric event emitted by one of the service clients.
///
/// The variant is the event's kind tag. Events are immutable once emitted and
/// are moved into whichever handler receives them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric_type")]
pub enum MetricEvent {
    #[serde(rename = "LLM")]
    Llm(LlmMetrics),
    #[serde(rename = "STT")]
    Stt(SttMetrics),
    #[serde(rename = "EOU")]
    Eou(EouMetrics),
    #[serde(rename = "TTS")]
    Tts(TtsMetrics),
}

impl MetricEvent {
    /// Returns the kind tag of this event.
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Llm(_) => MetricKind::Llm,
            Self::Stt(_) => MetricKind::Stt,
            Self::Eou(_) => MetricKind::Eou,
            Self::Tts(_) => MetricKind::Tts,
        }
    }

    /// Flattens the event into `(source field name, value)` pairs, in
    /// declaration order.
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        match self {
            Self::Llm(m) => vec![
                ("request_id", m.request_id.as_str().into()),
                ("ttft", m.ttft.into()),
                ("duration", m.duration.into()),
                ("prompt_tokens", m.prompt_tokens.into()),
                ("completion_tokens", m.completion_tokens.into()),
                ("tokens_per_second", m.tokens_per_second.into()),
            ],
            Self::Stt(m) => vec![
                ("duration", m.duration.into()),
                ("audio_duration", m.audio_duration.into()),
                ("streamed", m.streamed.into()),
            ],
            Self::Eou(m) => vec![
                ("end_of_utterance_delay", m.end_of_utterance_delay.into()),
                ("transcription_delay", m.transcription_delay.into()),
            ],
            Self::Tts(m) => vec![
                ("request_id", m.request_id.as_str().into()),
                ("ttfb", m.ttfb.into()),
                ("duration", m.duration.into()),
                ("audio_duration", m.audio_duration.into()),
                ("streamed", m.streamed.into()),
            ],
        }
    }
}
