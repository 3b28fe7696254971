//! Chat configuration
//!
//! Loaded from `~/.murmur/config.toml` when present. Every field has a
//! default so a partial (or missing) file is fine. `MURMUR_SERVER_URL` and
//! `MURMUR_MODEL` override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::ai;
use crate::error::ConfigError;
use crate::markdown::RenderConfig;

/// Environment variable overriding `server_url`
pub const SERVER_URL_ENV: &str = "MURMUR_SERVER_URL";
/// Environment variable overriding `model`
pub const MODEL_ENV: &str = "MURMUR_MODEL";

/// Settings for talking to the local server and rendering replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// OpenAI-compatible base URL, e.g. `http://127.0.0.1:8080/v1`
    pub server_url: String,
    /// Model id; when unset the first model the server lists is used
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    pub models_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub render: RenderConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            server_url: ai::DEFAULT_SERVER_URL.to_string(),
            model: None,
            temperature: ai::DEFAULT_TEMPERATURE,
            max_tokens: ai::DEFAULT_MAX_TOKENS,
            system_prompt: None,
            models_timeout_secs: ai::MODELS_TIMEOUT_SECS,
            stream_timeout_secs: ai::STREAM_TIMEOUT_SECS,
            connect_timeout_secs: ai::CONNECT_TIMEOUT_SECS,
            max_retries: ai::DEFAULT_MAX_RETRIES,
            render: RenderConfig::default(),
        }
    }
}

impl ChatConfig {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&crate::paths::config_file())?;
        config.apply_env();
        Ok(config)
    }

    /// Load from an explicit path. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `MURMUR_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                self.server_url = url;
            }
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            if !model.trim().is_empty() {
                self.model = Some(model);
            }
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    pub fn models_timeout(&self) -> Duration {
        Duration::from_secs(self.models_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
