//! Configuration and settings management
//!
//! Loads settings from environment variables and optional config files.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which chat transport delivers messages to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Telegram Bot API via teloxide
    #[default]
    Telegram,
}

/// Which session store backend holds conversational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Volatile in-process map (single-instance deployments)
    #[default]
    Memory,
    /// Shared S3/R2 bucket with expiry (multi-instance deployments)
    Durable,
}

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Base URL of the Fayol backend API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Timeout for backend API calls, in seconds
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,

    /// Web app URL shown in registration hints
    #[serde(default = "default_web_app_url")]
    pub web_app_url: String,

    /// Chat transport selector
    #[serde(default)]
    pub transport: TransportKind,

    /// Telegram Bot API token (required when transport = telegram)
    pub telegram_token: Option<String>,

    /// Maximum messages per sender per minute before a cooldown
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: usize,

    /// Whether the bot reacts to group conversations at all
    #[serde(default)]
    pub group_support: bool,

    /// Session store backend selector
    #[serde(default)]
    pub session_backend: SessionBackend,

    /// Session time-to-live in seconds (inactivity-based)
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// OpenAI-compatible key for voice transcription (STT optional)
    pub openai_api_key: Option<String>,
    /// Transcription model name
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    /// OCR service endpoint (receipt images degrade gracefully when unset)
    pub ocr_endpoint: Option<String>,

    /// S3/R2 access key ID (durable session backend)
    pub r2_access_key_id: Option<String>,
    /// S3/R2 secret access key
    pub r2_secret_access_key: Option<String>,
    /// S3/R2 endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// S3/R2 bucket name
    pub r2_bucket_name: Option<String>,
}

fn default_api_url() -> String {
    "http://localhost:3000".to_string()
}

const fn default_api_timeout_secs() -> u64 {
    30
}

fn default_web_app_url() -> String {
    "http://localhost:3000".to_string()
}

const fn default_rate_limit_per_minute() -> usize {
    30
}

const fn default_session_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case;
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Timeout applied to every outbound collaborator call.
    #[must_use]
    pub const fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Session inactivity TTL.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize() -> Result<(), Box<dyn std::error::Error>> {
        let settings: Settings = serde_json::from_str("{}")?;
        assert_eq!(settings.rate_limit_per_minute, 30);
        assert!(!settings.group_support);
        assert_eq!(settings.session_backend, SessionBackend::Memory);
        assert_eq!(settings.transport, TransportKind::Telegram);
        assert_eq!(settings.session_ttl_secs, 7 * 24 * 60 * 60);
        assert_eq!(settings.stt_model, "whisper-1");
        Ok(())
    }

    #[test]
    fn test_backend_selector_parsing() -> Result<(), Box<dyn std::error::Error>> {
        let settings: Settings = serde_json::from_str(r#"{"session_backend": "durable"}"#)?;
        assert_eq!(settings.session_backend, SessionBackend::Durable);
        Ok(())
    }
}
