//! Attaches the metrics pipeline to the service clients.

use voxline_types::{MetricKind, MetricsSource, EOU_METRICS_COLLECTED, METRICS_COLLECTED};

use crate::error::ObserveError;
use crate::pipeline::MetricsHandle;

/// Registers the four metrics subscriptions:
///
/// | client | channel | kind |
/// |--------|---------|------|
/// | `llm` | `metrics_collected` | `LLM` |
/// | `stt` | `metrics_collected` | `STT` |
/// | `stt` | `eou_metrics_collected` | `EOU` |
/// | `tts` | `metrics_collected` | `TTS` |
///
/// Call once at startup. The handlers only enqueue onto `handle`, so the
/// emitting clients never wait on file I/O.
///
/// Every subscription is attempted even if an earlier one is rejected, so a
/// single bad channel only loses that channel's metrics.
///
/// # Errors
///
/// Returns `ObserveError::Subscribe` for the first channel a client
/// rejected.
pub fn setup_metrics_logging(
    llm: &dyn MetricsSource,
    stt: &dyn MetricsSource,
    tts: &dyn MetricsSource,
    handle: &MetricsHandle,
) -> Result<(), ObserveError> {
    tracing::info!("setting up metrics logging");

    let subscriptions: [(&dyn MetricsSource, &str, MetricKind); 4] = [
        (llm, METRICS_COLLECTED, MetricKind::Llm),
        (stt, METRICS_COLLECTED, MetricKind::Stt),
        (stt, EOU_METRICS_COLLECTED, MetricKind::Eou),
        (tts, METRICS_COLLECTED, MetricKind::Tts),
    ];

    let mut first_error = None;
    for (source, channel, kind) in subscriptions {
        match source.on(channel, handle.handler(kind)) {
            Ok(()) => tracing::debug!(
                source = source.source_name(),
                channel,
                metric_type = kind.as_str(),
                "metrics subscription registered"
            ),
            Err(e) => {
                tracing::error!(
                    source = source.source_name(),
                    channel,
                    metric_type = kind.as_str(),
                    "metrics subscription rejected: {}",
                    e
                );
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
