use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_max_tokens() -> u32 {
    100
}

fn default_temperature() -> f32 {
    0.7
}

fn default_system_prompt() -> String {
    "You are a helpful AI assistant. Keep responses short and conversational for phone calls, \
     under 50 words."
        .to_string()
}

/// Settings for the hosted chat-completion endpoint (OpenAI-compatible).
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl LlmConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Full URL of the chat completions endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn default_stt_binary() -> PathBuf {
    PathBuf::from("whisper")
}

fn default_stt_model() -> PathBuf {
    PathBuf::from("assets/whisper/ggml-base.en.bin")
}

fn default_tts_binary() -> PathBuf {
    PathBuf::from("piper")
}

fn default_tts_model() -> PathBuf {
    PathBuf::from("assets/voices/en_US-lessac-medium.onnx")
}

fn default_tts_speed() -> f32 {
    1.0
}

/// Local speech engine locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// whisper.cpp-compatible binary.
    #[serde(default = "default_stt_binary")]
    pub stt_binary: PathBuf,
    #[serde(default = "default_stt_model")]
    pub stt_model: PathBuf,
    /// piper-compatible binary.
    #[serde(default = "default_tts_binary")]
    pub tts_binary: PathBuf,
    #[serde(default = "default_tts_model")]
    pub tts_model: PathBuf,
    /// Speech speed multiplier, 0.1 to 10.0.
    #[serde(default = "default_tts_speed")]
    pub tts_speed: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_binary: default_stt_binary(),
            stt_model: default_stt_model(),
            tts_binary: default_tts_binary(),
            tts_model: default_tts_model(),
            tts_speed: default_tts_speed(),
        }
    }
}
