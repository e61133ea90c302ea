//! Outbound call placement through the telephony provider's REST API.

use crate::config::TelephonyConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors raised while placing a call.
#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("telephony is not configured: {0}")]
    Config(String),
    #[error("invalid phone number `{0}`: expected E.164, e.g. +15551234567")]
    InvalidNumber(String),
    #[error("webhook {url} is not reachable: {reason}")]
    WebhookUnreachable { url: String, reason: String },
    #[error("request failed: {0}")]
    Http(String),
    #[error("provider rejected the call with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A call the provider accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct CallRecord {
    pub sid: String,
    #[serde(default)]
    pub status: String,
}

/// Client for the provider's Calls resource.
#[derive(Debug)]
pub struct TelephonyClient {
    http: reqwest::Client,
    config: TelephonyConfig,
}

impl TelephonyClient {
    /// Builds a client, rejecting configs without credentials or caller ID.
    pub fn new(config: TelephonyConfig) -> Result<Self, TelephonyError> {
        if config.account_sid.is_empty() || config.auth_token.is_empty() {
            return Err(TelephonyError::Config(
                "account_sid and auth_token are required".to_string(),
            ));
        }
        validate_number(&config.from_number)?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TelephonyError::Http(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Confirms the voice webhook answers before the provider is asked to
    /// fetch it.
    pub async fn check_webhook(&self, url: &str) -> Result<(), TelephonyError> {
        let unreachable = |reason: String| TelephonyError::WebhookUnreachable {
            url: url.to_string(),
            reason,
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unreachable(format!("status {}", response.status())));
        }
        Ok(())
    }

    /// Asks the provider to dial `to` and fetch call instructions from
    /// `webhook_url`.
    pub async fn place_call(
        &self,
        to: &str,
        webhook_url: &str,
    ) -> Result<CallRecord, TelephonyError> {
        validate_number(to)?;

        let params = [
            ("To", to),
            ("From", self.config.from_number.as_str()),
            ("Url", webhook_url),
            ("Method", "POST"),
        ];
        let response = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| TelephonyError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let record: CallRecord = response
            .json()
            .await
            .map_err(|e| TelephonyError::Http(format!("invalid response body: {}", e)))?;
        tracing::info!(sid = %record.sid, status = %record.status, to, "call placed");
        Ok(record)
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

/// Checks `number` is E.164: a `+` followed by 8 to 15 digits.
pub fn validate_number(number: &str) -> Result<(), TelephonyError> {
    let digits = number
        .strip_prefix('+')
        .ok_or_else(|| TelephonyError::InvalidNumber(number.to_string()))?;
    if (8..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(TelephonyError::InvalidNumber(number.to_string()))
    }
}

/// URL of the voice webhook under `public_url`.
pub fn voice_webhook_url(public_url: &str) -> String {
    format!("{}/voice", public_url.trim_end_matches('/'))
}
