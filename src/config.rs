//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml, optional)
//! - Environment variables with the APP_ prefix (nested keys separated by `__`)
//! - Well-known plain environment variables used by existing deployments
//!   (OPENAI_API_KEY, OPENAI_REALTIME_URL, SILENCE_MS, ...)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Plain deployment variables (HOST, PORT, OPENAI_API_KEY, ...)
//! 2. APP_ prefixed variables (APP_UPSTREAM__COMMIT_INTERVAL_MS=250)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cors: CorsConfig,
    pub observability: ObservabilityConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Remote realtime transcription service settings.
///
/// ## Fields:
/// - `url`: realtime WebSocket endpoint (`wss://...`); an `*.openai.azure.com`
///   host switches authentication to the `api-key` header
/// - `api_key`: credential; empty means "not configured" and every session
///   ends right after `ready` with a configuration error
/// - `silence_duration_ms` / `prefix_padding_ms` / `vad_threshold`: server VAD tuning
/// - `commit_interval_ms`: how often the inbound pump commits the audio buffer
/// - `ping_interval_secs` / `ping_timeout_secs`: keepalive on both sockets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub url: String,
    pub api_key: String,
    pub transcribe_model: String,
    pub language: String,
    pub silence_duration_ms: u32,
    pub prefix_padding_ms: u32,
    pub vad_threshold: f64,
    pub commit_interval_ms: u64,
    pub instructions: String,
    pub ping_interval_secs: u64,
    pub ping_timeout_secs: u64,
    pub max_message_bytes: usize,
}

/// Browser origins allowed to call the HTTP and WebSocket endpoints.
///
/// Entries like `https://*.lovable.app` match the domain and any of its subdomains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Observability store sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Number of recent values kept per ring.
    pub ring_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            upstream: UpstreamConfig::default(),
            cors: CorsConfig {
                allowed_origins: vec![
                    "https://*.lovable.app".to_string(),
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            observability: ObservabilityConfig {
                ring_capacity: crate::observability::DEFAULT_RING_CAPACITY,
            },
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.openai.com/v1/realtime?model=gpt-4o-mini-realtime-preview-2024-12-17"
                .to_string(),
            api_key: String::new(),
            transcribe_model: "whisper-1".to_string(),
            language: "sv".to_string(),
            silence_duration_ms: 600,
            prefix_padding_ms: 300,
            vad_threshold: 0.5,
            commit_interval_ms: 500,
            instructions: "Transcribe the user's speech to text only. Do not speak back."
                .to_string(),
            ping_interval_secs: 10,
            ping_timeout_secs: 10,
            max_message_bytes: 32 * 1024 * 1024,
        }
    }
}

impl UpstreamConfig {
    /// The configured credential, if any (blank counts as missing).
    pub fn credential(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (!key.is_empty()).then_some(key)
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Longest the upstream may stay completely silent before the session is torn down.
    pub fn keepalive_deadline(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs + self.ping_timeout_secs)
    }
}

/// Plain environment variables mapped onto config keys.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("OPENAI_REALTIME_URL", "upstream.url"),
    ("OPENAI_API_KEY", "upstream.api_key"),
    ("REALTIME_TRANSCRIBE_MODEL", "upstream.transcribe_model"),
    ("INPUT_LANGUAGE", "upstream.language"),
    ("SILENCE_MS", "upstream.silence_duration_ms"),
    ("PREFIX_PADDING_MS", "upstream.prefix_padding_ms"),
    ("COMMIT_INTERVAL_MS", "upstream.commit_interval_ms"),
];

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_UPSTREAM__LANGUAGE=en`: Override transcription language
    /// - `OPENAI_API_KEY=sk-...`: Upstream credential
    /// - `ALLOWED_ORIGINS=https://*.example.com,http://localhost:3000`: CORS list
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        for (var, key) in ENV_OVERRIDES {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(*key, value)?;
            }
        }

        if let Ok(origins) = env::var("ALLOWED_ORIGINS") {
            settings = settings.set_override("cors.allowed_origins", split_origins(&origins))?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        let url = self.upstream.url.as_str();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(anyhow::anyhow!(
                "Upstream URL must use ws:// or wss:// (got {})",
                url
            ));
        }

        if self.upstream.commit_interval_ms == 0 {
            return Err(anyhow::anyhow!("Commit interval must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.upstream.vad_threshold) {
            return Err(anyhow::anyhow!("VAD threshold must be between 0.0 and 1.0"));
        }

        if self.upstream.ping_interval_secs == 0 {
            return Err(anyhow::anyhow!("Ping interval must be greater than 0"));
        }

        if self.observability.ring_capacity == 0 {
            return Err(anyhow::anyhow!("Ring capacity must be greater than 0"));
        }

        Ok(())
    }

    /// JSON view of the configuration with the credential masked.
    pub fn redacted(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(key) = value.pointer_mut("/upstream/api_key") {
            *key = serde_json::Value::String(
                if self.upstream.credential().is_some() { "***" } else { "" }.to_string(),
            );
        }
        Ok(value)
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upstream.silence_duration_ms, 600);
        assert_eq!(config.upstream.prefix_padding_ms, 300);
        assert_eq!(config.upstream.commit_interval(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.upstream.url = "https://api.openai.com/v1/realtime".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.upstream.vad_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.upstream.commit_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_credential_is_missing() {
        let mut upstream = UpstreamConfig::default();
        assert_eq!(upstream.credential(), None);
        upstream.api_key = "   ".to_string();
        assert_eq!(upstream.credential(), None);
        upstream.api_key = " sk-test ".to_string();
        assert_eq!(upstream.credential(), Some("sk-test"));
    }

    #[test]
    fn test_keepalive_deadline() {
        let upstream = UpstreamConfig::default();
        assert_eq!(upstream.ping_interval(), Duration::from_secs(10));
        assert_eq!(upstream.keepalive_deadline(), Duration::from_secs(20));
    }

    #[test]
    fn test_redacted_hides_key() {
        let mut config = AppConfig::default();
        config.upstream.api_key = "sk-secret".to_string();
        let rendered = config.redacted().unwrap();
        assert_eq!(rendered["upstream"]["api_key"], "***");
        assert!(!rendered.to_string().contains("sk-secret"));
        assert_eq!(rendered["server"]["port"], 8080);
    }

    #[test]
    fn test_split_origins() {
        assert_eq!(
            split_origins(" https://*.lovable.app, ,http://localhost:3000 "),
            vec![
                "https://*.lovable.app".to_string(),
                "http://localhost:3000".to_string()
            ]
        );
    }
}
