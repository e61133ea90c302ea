//! Speech and language service clients for the Voxline voice assistant.
//!
//! Three clients cover one phone turn end to end:
//!
//! - [`SttService`] transcribes caller audio through a local whisper.cpp
//!   binary.
//! - [`LlmClient`] sends the transcript to a hosted, OpenAI-compatible chat
//!   completion endpoint.
//! - [`TtsService`] renders the reply through a local piper binary.
//!
//! [`VoiceSession`] chains the three for one caller turn.
//!
//! Each client implements [`voxline_types::MetricsSource`] and reports one
//! metric event per completed request, which is how the metrics pipeline in
//! `voxline-observe` attaches to them.

pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod session;
pub mod stt;
pub mod tts;

pub use config::{LlmConfig, SpeechConfig};
pub use error::VoiceError;
pub use events::EventEmitter;
pub use llm::LlmClient;
pub use session::{Turn, VoiceSession};
pub use stt::SttService;
pub use tts::TtsService;
