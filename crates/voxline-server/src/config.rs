//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use voxline_observe::MetricsConfig;
use voxline_voice::{LlmConfig, SpeechConfig};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Metrics CSV settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Hosted LLM settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Local speech engine settings.
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Telephony provider settings.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Publicly reachable base URL of this server (e.g. a tunnel URL).
    /// The telephony provider fetches `{public_url}/voice`.
    #[serde(default)]
    pub public_url: String,
}

/// Telephony provider credentials and call settings.
#[derive(Clone, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default)]
    pub account_sid: String,

    #[serde(default)]
    pub auth_token: String,

    /// Caller ID for outbound calls, E.164.
    #[serde(default)]
    pub from_number: String,

    /// REST API base URL.
    #[serde(default = "default_telephony_api_base")]
    pub api_base: String,

    /// Voice used for `<Say>` prompts.
    #[serde(default = "default_voice")]
    pub voice: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voxline_observe=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_telephony_api_base() -> String {
    "https://api.twilio.com".to_string()
}

fn default_voice() -> String {
    "Polly.Joanna".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: String::new(),
        }
    }
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            api_base: default_telephony_api_base(),
            voice: default_voice(),
        }
    }
}

impl fmt::Debug for TelephonyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelephonyConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .field("api_base", &self.api_base)
            .field("voice", &self.voice)
            .finish()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Where a loaded [`Config`] came from, before environment overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Parsed from the given file.
    File,
    /// The file was absent; built-in defaults were used.
    Defaults,
}

impl ConfigOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigOrigin::File => "file",
            ConfigOrigin::Defaults => "defaults",
        }
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Nothing is logged here because callers load config before tracing is
/// initialized; the returned [`ConfigOrigin`] says whether the file was used.
///
/// Environment variable overrides:
/// - `VOXLINE_HOST` overrides `server.host`
/// - `VOXLINE_PORT` overrides `server.port`
/// - `VOXLINE_PUBLIC_URL` (or `NGROK_URL`) overrides `server.public_url`
/// - `VOXLINE_METRICS_PATH` overrides `metrics.path`
/// - `GROQ_API_KEY` overrides `llm.api_key`
/// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_NUMBER` override the
///   `telephony` credentials and caller ID
/// - `VOXLINE_LOG_LEVEL` overrides `logging.level`
/// - `VOXLINE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<(Config, ConfigOrigin), ConfigError> {
    let (mut config, origin) = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => (toml::from_str(&contents)?, ConfigOrigin::File),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Config::default(), ConfigOrigin::Defaults)
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => (Config::default(), ConfigOrigin::Defaults),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok((config, origin))
}

/// Applies environment overrides using `lookup` to read variables.
fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("VOXLINE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("VOXLINE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(url) = lookup("VOXLINE_PUBLIC_URL").or_else(|| lookup("NGROK_URL")) {
        config.server.public_url = url;
    }
    if let Some(path) = lookup("VOXLINE_METRICS_PATH") {
        config.metrics.path = path.into();
    }
    if let Some(key) = lookup("GROQ_API_KEY") {
        config.llm.api_key = key;
    }
    if let Some(sid) = lookup("TWILIO_ACCOUNT_SID") {
        config.telephony.account_sid = sid;
    }
    if let Some(token) = lookup("TWILIO_AUTH_TOKEN") {
        config.telephony.auth_token = token;
    }
    if let Some(number) = lookup("TWILIO_NUMBER") {
        config.telephony.from_number = number;
    }
    if let Some(level) = lookup("VOXLINE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("VOXLINE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
