//! HTTP handlers for the voice webhooks.

use crate::twiml;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Form},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Upper bound on gathered speech forwarded to the model.
const MAX_SPEECH_BYTES: usize = 4 * 1024;

/// Form fields the provider posts after a `<Gather>`.
#[derive(Debug, Default, Deserialize)]
pub struct SpeechForm {
    /// Recognized caller speech; absent when nothing was understood.
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: String,
    /// Recognizer confidence, 0.0 to 1.0, as sent by the provider.
    #[serde(rename = "Confidence", default)]
    pub confidence: Option<String>,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("voice service failed: {0}")]
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// TwiML response with the XML content type.
pub struct Twiml(pub String);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "application/xml")], self.0).into_response()
    }
}

/// Handler for `GET /`.
pub async fn root_handler() -> Json<Value> {
    Json(json!({ "message": "Voxline voice agent is running" }))
}

/// Handler for `GET /health`.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handler for `GET|POST /voice`. Answers an incoming or outbound call.
pub async fn voice_handler(Extension(state): Extension<Arc<AppState>>) -> Twiml {
    tracing::info!("answering call");
    Twiml(twiml::greeting(&state.voice))
}

/// Handler for `POST /process-speech`.
///
/// Sends the caller's speech to the model and speaks the reply. Model errors
/// are answered with a fixed apology so the call continues.
pub async fn process_speech_handler(
    Extension(state): Extension<Arc<AppState>>,
    Form(form): Form<SpeechForm>,
) -> Result<Twiml, ApiError> {
    let speech = form.speech_result.trim();
    tracing::info!(
        speech,
        confidence = form.confidence.as_deref().unwrap_or("0"),
        "caller speech received"
    );

    if speech.is_empty() {
        return Ok(Twiml(twiml::reprompt(&state.voice)));
    }
    if speech.len() > MAX_SPEECH_BYTES {
        return Err(ApiError::BadRequest(format!(
            "speech result exceeds {} bytes",
            MAX_SPEECH_BYTES
        )));
    }

    let reply = match state.session.llm().complete(speech).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            tracing::warn!("model returned an empty reply");
            twiml::APOLOGY.to_string()
        }
        Err(e) => {
            tracing::warn!("model request failed: {}", e);
            twiml::APOLOGY.to_string()
        }
    };

    tracing::info!(reply = %reply, "replying to caller");
    Ok(Twiml(twiml::reply(&state.voice, &reply)))
}

/// Handler for `POST /turn`.
///
/// The body is one caller utterance as raw PCM (16 kHz, s16le, mono), posted
/// once the caller stops speaking. Responds with the synthesized reply as raw
/// PCM, or `204 No Content` when no speech was recognized.
pub async fn turn_handler(
    Extension(state): Extension<Arc<AppState>>,
    audio: Bytes,
) -> Result<Response, ApiError> {
    let speech_ended_at = Instant::now();
    if audio.is_empty() {
        return Err(ApiError::BadRequest("turn audio is empty".to_string()));
    }

    let turn = state
        .session
        .handle_turn(&audio, speech_ended_at)
        .await
        .map_err(|e| {
            tracing::warn!("voice turn failed: {}", e);
            ApiError::Upstream(e.to_string())
        })?;

    if turn.transcript.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    Ok((
        [(header::CONTENT_TYPE, "audio/L16;rate=22050;channels=1")],
        turn.audio,
    )
        .into_response())
}
