//! Client configuration
//!
//! Endpoint, timeouts and retry policy for the local server client.

use std::time::Duration;

use crate::ai::retry::RetryConfig;
use crate::config::ChatConfig;
use crate::constants;

/// Configuration for [`super::LocalServerClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// OpenAI-compatible base URL without a trailing slash
    pub base_url: String,
    /// Timeout for metadata calls such as model listing
    pub models_timeout: Duration,
    /// Timeout for a whole generation stream
    pub stream_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: constants::ai::DEFAULT_SERVER_URL.to_string(),
            models_timeout: Duration::from_secs(constants::ai::MODELS_TIMEOUT_SECS),
            stream_timeout: Duration::from_secs(constants::ai::STREAM_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(constants::ai::CONNECT_TIMEOUT_SECS),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_chat_config(config: &ChatConfig) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            models_timeout: config.models_timeout(),
            stream_timeout: config.stream_timeout(),
            connect_timeout: config.connect_timeout(),
            retry: RetryConfig::with_max_retries(config.max_retries),
        }
    }

    /// `GET` endpoint listing the loaded models
    pub fn models_url(&self) -> String {
        format!("{}/models", self.base_url.trim_end_matches('/'))
    }

    /// `POST` endpoint for streamed chat completions
    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let config = ClientConfig {
            base_url: "http://localhost:8080/v1/".into(),
            ..ClientConfig::default()
        };
        assert_eq!(config.models_url(), "http://localhost:8080/v1/models");
        assert_eq!(config.chat_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_from_chat_config() {
        let chat = ChatConfig {
            server_url: "http://10.0.0.2:9000/v1".into(),
            max_retries: 0,
            models_timeout_secs: 1,
            ..ChatConfig::default()
        };
        let config = ClientConfig::from_chat_config(&chat);
        assert_eq!(config.base_url, "http://10.0.0.2:9000/v1");
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.models_timeout, Duration::from_secs(1));
    }
}
