use crate::config::LlmConfig;
use crate::error::VoiceError;
use crate::events::EventEmitter;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use voxline_types::{
    LlmMetrics, MetricEvent, MetricsHandler, MetricsSource, SubscribeError, METRICS_COLLECTED,
};

/// Timeout for one completion request.
const LLM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Client for a hosted chat-completion model.
///
/// Publishes one [`LlmMetrics`] event on `metrics_collected` per successful
/// completion.
#[derive(Debug)]
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
    events: EventEmitter,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config,
            events: EventEmitter::new("llm", &[METRICS_COLLECTED]),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    /// Sends `prompt` as the user turn and returns the model's reply.
    pub async fn complete(&self, prompt: &str) -> Result<String, VoiceError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let started = Instant::now();
        let response = self
            .http
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Llm(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Llm(format!("status {}: {}", status, detail)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Llm(format!("invalid response body: {}", e)))?;
        let elapsed = started.elapsed().as_secs_f64();

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| VoiceError::Llm("response contained no choices".to_string()))?;

        let usage = parsed.usage.unwrap_or_default();
        if usage.completion_tokens == 0 {
            warn!("LLM response carried no usage block");
        }
        let tokens_per_second = if elapsed > 0.0 {
            f64::from(usage.completion_tokens) / elapsed
        } else {
            0.0
        };

        info!(
            model = %self.config.model,
            elapsed_ms = (elapsed * 1000.0) as u64,
            "LLM completion received"
        );

        // The reply arrives in one body, so first token and completion coincide.
        self.events.emit(
            METRICS_COLLECTED,
            MetricEvent::Llm(LlmMetrics {
                request_id: parsed
                    .id
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                ttft: elapsed,
                duration: elapsed,
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                tokens_per_second,
            }),
        );

        Ok(reply)
    }
}

impl MetricsSource for LlmClient {
    fn source_name(&self) -> &str {
        self.events.client()
    }

    fn on(&self, channel: &str, handler: MetricsHandler) -> Result<(), SubscribeError> {
        self.events.on(channel, handler)
    }
}
