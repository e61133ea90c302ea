use crate::error::VoiceError;
use crate::events::EventEmitter;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use voxline_types::{
    MetricEvent, MetricsHandler, MetricsSource, SubscribeError, TtsMetrics, METRICS_COLLECTED,
};

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for TTS process execution.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Piper emits 22050 Hz, 16-bit mono PCM.
const TTS_BYTES_PER_SECOND: f64 = 22_050.0 * 2.0;

/// Speech synthesizer backed by a piper-compatible binary.
///
/// Publishes one [`TtsMetrics`] event on `metrics_collected` per synthesis.
#[derive(Debug, Clone)]
pub struct TtsService {
    model_path: PathBuf,
    piper_binary: PathBuf,
    speed: f32,
    timeout: Duration,
    events: Arc<EventEmitter>,
}

impl TtsService {
    pub fn new(model_path: impl AsRef<Path>, piper_binary: impl AsRef<Path>) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            piper_binary: piper_binary.as_ref().to_path_buf(),
            speed: 1.0,
            timeout: TTS_TIMEOUT,
            events: Arc::new(EventEmitter::new("tts", &[METRICS_COLLECTED])),
        }
    }

    /// Sets the speech speed multiplier (1.0 is normal).
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Overrides how long one synthesis may run before the process is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Synthesizes speech from `text`.
    ///
    /// Returns raw PCM audio (s16le, 22050 Hz).
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        if !self.model_path.exists() {
            return Err(VoiceError::Tts(format!(
                "Model file not found: {:?}",
                self.model_path
            )));
        }

        if self.speed < 0.1 || self.speed > 10.0 {
            return Err(VoiceError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }

        let started = Instant::now();

        let mut command = Command::new(&self.piper_binary);
        command
            .arg("--model")
            .arg(&self.model_path)
            .arg("--output_raw")
            // length_scale is the inverse of speed: 2.0x speed -> 0.5 length.
            .arg("--length_scale")
            .arg((1.0 / self.speed).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn piper: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Tts("Failed to open stdin".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| VoiceError::Tts("Failed to open stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| VoiceError::Tts("Failed to open stderr".to_string()))?;

        // Write stdin and drain stderr on their own tasks so a full pipe
        // cannot stall the stdout reader.
        let text_owned = text.to_string();
        let write_task = tokio::spawn(async move {
            stdin.write_all(text_owned.as_bytes()).await?;
            stdin.shutdown().await
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let read_audio = async {
            let mut audio = Vec::new();
            let mut first_byte = None;
            let mut chunk = [0u8; 8192];
            loop {
                let n = stdout.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                if first_byte.is_none() {
                    first_byte = Some(started.elapsed());
                }
                audio.extend_from_slice(&chunk[..n]);
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((audio, first_byte, status))
        };

        let (audio, first_byte, status) = tokio::time::timeout(self.timeout, read_audio)
            .await
            .map_err(|_| {
                VoiceError::Tts(format!(
                    "TTS process timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| VoiceError::Tts(format!("Failed to read piper output: {}", e)))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Tts(format!(
                    "Failed to write to piper stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(VoiceError::Tts(format!("Stdin task failed: {}", e))),
        }

        if !status.success() {
            let stderr = stderr_task.await.unwrap_or_default();
            return Err(VoiceError::Tts(format!(
                "Piper failed: {}",
                String::from_utf8_lossy(&stderr)
            )));
        }

        let duration = started.elapsed();
        self.events.emit(
            METRICS_COLLECTED,
            MetricEvent::Tts(TtsMetrics {
                request_id: uuid::Uuid::new_v4().to_string(),
                ttfb: first_byte.unwrap_or(duration).as_secs_f64(),
                duration: duration.as_secs_f64(),
                audio_duration: audio.len() as f64 / TTS_BYTES_PER_SECOND,
                streamed: false,
            }),
        );

        Ok(audio)
    }
}

impl MetricsSource for TtsService {
    fn source_name(&self) -> &str {
        self.events.client()
    }

    fn on(&self, channel: &str, handler: MetricsHandler) -> Result<(), SubscribeError> {
        self.events.on(channel, handler)
    }
}
