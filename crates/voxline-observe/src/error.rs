//! Error types for the metrics pipeline.

use voxline_types::{MetricKind, ParseMetricKindError, SubscribeError};

/// Errors that can occur while normalizing, storing, or persisting metrics.
///
/// None of these are fatal to the host process. The pipeline consumer logs
/// them and keeps accepting events.
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    /// An event carried a kind tag that is not one of LLM, STT, EOU, TTS.
    #[error("metrics event rejected: {0}")]
    UnknownKind(#[from] ParseMetricKindError),

    /// A typed event arrived on a channel declared for a different kind.
    #[error("metrics event rejected: declared {declared} but event is {actual}")]
    KindMismatch {
        /// The kind the subscription was registered for.
        declared: MetricKind,
        /// The kind of the event that actually arrived.
        actual: MetricKind,
    },

    /// Writing the backing file failed.
    #[error("metrics file write failed: {0}")]
    Io(#[from] std::io::Error),

    /// A service client refused a metrics subscription.
    #[error("metrics subscription failed: {0}")]
    Subscribe(#[from] SubscribeError),

    /// The pipeline consumer has stopped and no longer accepts work.
    #[error("metrics pipeline is closed")]
    PipelineClosed,
}
