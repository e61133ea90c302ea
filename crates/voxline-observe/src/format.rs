//! Human-readable metric summaries for the operational log.

use voxline_types::MetricEvent;

fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Summarizes the headline fields of `event`, one field per line.
pub fn format_metrics(event: &MetricEvent) -> String {
    match event {
        MetricEvent::Llm(m) => format!(
            "LLM metrics:\n  Prompt tokens: {}\n  Completion tokens: {}\n  Tokens/s: {:.1}\n  TTFT: {:.3}s",
            m.prompt_tokens, m.completion_tokens, m.tokens_per_second, m.ttft
        ),
        MetricEvent::Stt(m) => format!(
            "STT metrics:\n  Processing: {:.3}s\n  Audio duration: {:.3}s\n  Streamed: {}",
            m.duration,
            m.audio_duration,
            flag(m.streamed)
        ),
        MetricEvent::Eou(m) => format!(
            "EOU metrics:\n  Silence delay: {:.3}s\n  Transcription delay: {:.3}s",
            m.end_of_utterance_delay, m.transcription_delay
        ),
        MetricEvent::Tts(m) => format!(
            "TTS metrics:\n  TTFB: {:.3}s\n  Processing: {:.3}s\n  Audio duration: {:.3}s\n  Streamed: {}",
            m.ttfb,
            m.duration,
            m.audio_duration,
            flag(m.streamed)
        ),
    }
}
