//! Subscription seam between service clients and metric consumers.

use crate::metrics::MetricEvent;
use std::sync::Arc;

/// Channel on which every service client reports its per-request metrics.
pub const METRICS_COLLECTED: &str = "metrics_collected";

/// Channel on which the speech recognizer reports end-of-utterance metrics.
pub const EOU_METRICS_COLLECTED: &str = "eou_metrics_collected";

/// Callback invoked once per emitted event.
///
/// Handlers run on the emitter's task and must return quickly; anything
/// slower than a channel send belongs on another task.
pub type MetricsHandler = Arc<dyn Fn(MetricEvent) + Send + Sync>;

/// A service client that publishes metric events on named channels.
pub trait MetricsSource {
    /// Short name of the client, used in diagnostics.
    fn source_name(&self) -> &str;

    /// Registers `handler` for every future event on `channel`.
    ///
    /// # Errors
    ///
    /// Returns `SubscribeError::UnknownChannel` if this client never
    /// publishes on `channel`.
    fn on(&self, channel: &str, handler: MetricsHandler) -> Result<(), SubscribeError>;
}

/// Errors raised while registering a metrics handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    /// The client does not publish on the requested channel.
    #[error("{client} does not publish on channel `{channel}`")]
    UnknownChannel {
        /// The client that rejected the subscription.
        client: String,
        /// The requested channel name.
        channel: String,
    },
}
