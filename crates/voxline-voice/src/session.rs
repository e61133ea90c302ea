//! One conversational turn across the three clients.

use crate::error::VoiceError;
use crate::llm::LlmClient;
use crate::stt::SttService;
use crate::tts::TtsService;
use std::sync::Arc;
use std::time::Instant;

/// Output of [`VoiceSession::handle_turn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// What the caller said. Empty when nothing was recognized.
    pub transcript: String,
    /// The model's answer. Empty when the transcript was empty.
    pub reply: String,
    /// Synthesized reply audio, raw PCM from the TTS engine.
    pub audio: Vec<u8>,
}

/// Drives speech recognition, the model and speech synthesis for a caller.
///
/// Each completed turn makes every client report its metrics: STT and EOU
/// from recognition, LLM from the completion, TTS from synthesis.
#[derive(Debug, Clone)]
pub struct VoiceSession {
    stt: Arc<SttService>,
    llm: Arc<LlmClient>,
    tts: Arc<TtsService>,
}

impl VoiceSession {
    pub fn new(stt: SttService, llm: LlmClient, tts: TtsService) -> Self {
        Self {
            stt: Arc::new(stt),
            llm: Arc::new(llm),
            tts: Arc::new(tts),
        }
    }

    pub fn stt(&self) -> &SttService {
        &self.stt
    }

    pub fn llm(&self) -> &LlmClient {
        &self.llm
    }

    pub fn tts(&self) -> &TtsService {
        &self.tts
    }

    /// Runs one turn: transcribe `audio`, ask the model, synthesize the reply.
    ///
    /// `speech_ended_at` is when the caller stopped speaking. A turn with no
    /// recognized speech stops after transcription.
    ///
    /// # Errors
    ///
    /// Returns the first client error; later stages are not run.
    pub async fn handle_turn(
        &self,
        audio: &[u8],
        speech_ended_at: Instant,
    ) -> Result<Turn, VoiceError> {
        let transcript = self.stt.transcribe_turn(audio, speech_ended_at).await?;
        if transcript.is_empty() {
            tracing::debug!("turn contained no recognizable speech");
            return Ok(Turn {
                transcript,
                reply: String::new(),
                audio: Vec::new(),
            });
        }

        let reply = self.llm.complete(&transcript).await?;
        let reply = reply.trim().to_string();
        let audio = self.tts.synthesize(&reply).await?;

        tracing::info!(
            transcript = %transcript,
            reply = %reply,
            audio_bytes = audio.len(),
            "voice turn completed"
        );
        Ok(Turn {
            transcript,
            reply,
            audio,
        })
    }
}
