use crate::error::VoiceError;
use crate::events::EventEmitter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use voxline_types::{
    EouMetrics, MetricEvent, MetricsHandler, MetricsSource, SttMetrics, SubscribeError,
    EOU_METRICS_COLLECTED, METRICS_COLLECTED,
};

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for STT process execution.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Input format: 16 kHz, 16-bit mono PCM.
const STT_BYTES_PER_SECOND: f64 = 16_000.0 * 2.0;

/// Speech recognizer backed by a whisper.cpp-compatible binary.
///
/// Publishes [`SttMetrics`] on `metrics_collected` for every transcription and
/// [`EouMetrics`] on `eou_metrics_collected` for every committed turn.
#[derive(Debug, Clone)]
pub struct SttService {
    model_path: PathBuf,
    binary_path: PathBuf,
    timeout: Duration,
    events: Arc<EventEmitter>,
}

impl SttService {
    pub fn new(model_path: impl Into<PathBuf>, binary_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
            timeout: STT_TIMEOUT,
            events: Arc::new(EventEmitter::new(
                "stt",
                &[METRICS_COLLECTED, EOU_METRICS_COLLECTED],
            )),
        }
    }

    /// Overrides how long one transcription may run before the process is
    /// killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Transcribes raw PCM and reports an STT metric.
    pub async fn transcribe(&self, audio_data: &[u8]) -> Result<String, VoiceError> {
        let started = Instant::now();
        let text = self.run_binary(audio_data).await?;

        self.events.emit(
            METRICS_COLLECTED,
            MetricEvent::Stt(SttMetrics {
                duration: started.elapsed().as_secs_f64(),
                audio_duration: audio_data.len() as f64 / STT_BYTES_PER_SECOND,
                streamed: false,
            }),
        );

        Ok(text)
    }

    /// Transcribes one caller turn whose speech ended at `speech_ended_at`.
    ///
    /// In addition to the STT metric, reports how long the turn waited after
    /// the speaker went silent before it was handed to the recognizer, and how
    /// long until the final transcript was available.
    pub async fn transcribe_turn(
        &self,
        audio_data: &[u8],
        speech_ended_at: Instant,
    ) -> Result<String, VoiceError> {
        let end_of_utterance_delay = speech_ended_at.elapsed().as_secs_f64();
        let text = self.transcribe(audio_data).await?;

        self.events.emit(
            EOU_METRICS_COLLECTED,
            MetricEvent::Eou(EouMetrics {
                end_of_utterance_delay,
                transcription_delay: speech_ended_at.elapsed().as_secs_f64(),
            }),
        );

        Ok(text)
    }

    async fn run_binary(&self, audio_data: &[u8]) -> Result<String, VoiceError> {
        if audio_data.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio_data.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let mut command = Command::new(&self.binary_path);

        // whisper.cpp: -m <model>, -f - reads audio from stdin; transcript on stdout.
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg("-")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Stt(format!("Failed to spawn STT binary: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Stt("Failed to open stdin".to_string()))?;

        stdin
            .write_all(audio_data)
            .await
            .map_err(|e| VoiceError::Stt(format!("Failed to write to stdin: {}", e)))?;
        drop(stdin); // EOF

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Stt(format!(
                    "STT process timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| VoiceError::Stt(format!("Failed to read stdout: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Stt(format!("STT binary failed: {}", stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl MetricsSource for SttService {
    fn source_name(&self) -> &str {
        self.events.client()
    }

    fn on(&self, channel: &str, handler: MetricsHandler) -> Result<(), SubscribeError> {
        self.events.on(channel, handler)
    }
}
