//! Configuration management for the chat relay.
//!
//! The relay reads an optional JSON file at `~/.chat-relay/config.json`
//! (or the path in `RELAY_CONFIG`) and then applies environment overrides.
//! The result is an immutable [`Config`] built once at startup and handed to
//! the constructors that need it.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `OPENAI_API_KEY` → upstream.api_key
//! - `OPENAI_MODEL` → upstream.model
//! - `OPENAI_BASE_URL` → upstream.base_url
//! - `PORT` → server.port
//! - `RELAY_BIND_ADDRESS` → server.host
//! - `RELAY_LOG_LEVEL` → observability.log_level
//! - `RELAY_LOG_FORMAT` → observability.log_format

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};

/// Model used when `OPENAI_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gpt-5";

/// Port used when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 3001;

/// Instruction sent upstream when a chat request carries no `system` field.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, concise AI assistant.";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".chat-relay"),
        |dirs| dirs.home_dir().join(".chat-relay"),
    )
}

/// Get the configuration file path, honouring `RELAY_CONFIG`.
pub fn config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_body_limit() -> usize {
    1024 * 1024
}

/// Upstream model API settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// API key; `None` leaves the relay running in a degraded state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier passed on every call
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL (no trailing `/v1`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whole-request timeout for upstream calls, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// The key never reaches a log line.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_timeout_secs() -> u64 {
    300
}

/// Chat behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Instruction used when a request omits `system`
    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_system_prompt: default_system_prompt(),
        }
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure for the relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream model API
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Chat defaults
    #[serde(default)]
    pub chat: ChatConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific path, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            let key = key.trim().to_string();
            self.upstream.api_key = (!key.is_empty()).then_some(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL").filter(|m| !m.trim().is_empty()) {
            self.upstream.model = model.trim().to_string();
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.upstream.base_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                Error::Config(format!("PORT must be a number between 1 and 65535, got {port:?}"))
            })?;
        }
        if let Some(bind) = lookup("RELAY_BIND_ADDRESS") {
            self.server.host = bind;
        }

        if let Some(level) = lookup("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        Ok(())
    }

    /// True when no upstream API key is configured.
    ///
    /// The relay still starts in this state; upstream calls fail at request time.
    pub fn missing_credentials(&self) -> bool {
        self.upstream
            .api_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty())
    }

    /// Get the `host:port` listen address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.upstream.model, "gpt-5");
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.body_limit_bytes, 1024 * 1024);
        assert_eq!(config.chat.default_system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert!(config.missing_credentials());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides_with(lookup(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_MODEL", "gpt-4o-mini"),
                ("OPENAI_BASE_URL", "http://127.0.0.1:9999/"),
                ("PORT", "8080"),
                ("RELAY_LOG_FORMAT", "json"),
            ]))
            .unwrap();

        assert_eq!(config.upstream.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.upstream.model, "gpt-4o-mini");
        assert_eq!(config.upstream.base_url, "http://127.0.0.1:9999");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.observability.log_format, "json");
        assert!(!config.missing_credentials());
    }

    #[test]
    fn test_empty_api_key_counts_as_missing() {
        let mut config = Config::default();
        config
            .apply_env_overrides_with(lookup(&[("OPENAI_API_KEY", "   ")]))
            .unwrap();
        assert!(config.upstream.api_key.is_none());
        assert!(config.missing_credentials());
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides_with(lookup(&[("PORT", "http")]))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let upstream = UpstreamConfig {
            api_key: Some("sk-very-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{upstream:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_load_from_file_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "server": { "port": 4000 }, "upstream": { "model": "gpt-4.1" } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.upstream.model, "gpt-4.1");
        assert_eq!(config.upstream.timeout_secs, 300);
        assert_eq!(config.bind_address(), "0.0.0.0:4000");
    }

    #[test]
    fn test_load_from_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ server: ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
