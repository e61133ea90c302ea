//! Voxline server library logic.
//!
//! Hosts the telephony webhooks and the audio turn endpoint, and owns the
//! voice session whose metrics are collected into the CSV store for the life
//! of the process.

pub mod api;
pub mod config;
pub mod telephony;
pub mod twiml;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use voxline_observe::{setup_metrics_logging, MetricsConfig, MetricsPipeline};
use voxline_voice::{LlmClient, SpeechConfig, SttService, TtsService, VoiceError, VoiceSession};

/// Webhook form posts are small; anything larger is rejected before parsing.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Turn audio is bounded by the recognizer's own input limit.
const MAX_TURN_AUDIO_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Speech recognition, model and synthesis for caller turns.
    pub session: Arc<VoiceSession>,
    /// Voice used for `<Say>` prompts.
    pub voice: String,
}

/// Builds the voice session from the `[llm]` and `[speech]` sections.
pub fn build_session(config: &config::Config) -> Result<VoiceSession, VoiceError> {
    let llm = LlmClient::new(config.llm.clone())?;
    Ok(session_with(llm, &config.speech))
}

/// Builds a voice session around an existing model client.
pub fn session_with(llm: LlmClient, speech: &SpeechConfig) -> VoiceSession {
    VoiceSession::new(
        SttService::new(&speech.stt_model, &speech.stt_binary),
        llm,
        TtsService::new(&speech.tts_model, &speech.tts_binary).with_speed(speech.tts_speed),
    )
}

/// Spawns the metrics pipeline and subscribes it to every client.
///
/// Every subscription is attempted; one that fails is logged and only that
/// channel goes unrecorded.
pub fn start_metrics(metrics: &MetricsConfig, session: &VoiceSession) -> MetricsPipeline {
    let pipeline = MetricsPipeline::spawn(metrics.open_store());
    if let Err(e) = setup_metrics_logging(
        session.llm(),
        session.stt(),
        session.tts(),
        &pipeline.handle(),
    ) {
        tracing::error!("metrics logging is incomplete: {}", e);
    }
    pipeline
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::root_handler))
        .route("/health", get(api::health_handler))
        .route("/voice", get(api::voice_handler).post(api::voice_handler))
        .route(twiml::PROCESS_SPEECH_PATH, post(api::process_speech_handler))
        .route(
            "/turn",
            post(api::turn_handler).layer(DefaultBodyLimit::max(MAX_TURN_AUDIO_BYTES)),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
