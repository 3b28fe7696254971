//! Local server client
//!
//! Talks to an OpenAI-compatible server (llama.cpp, LM Studio, vLLM, ...)
//! over HTTP: model listing and streamed chat completions.

mod config;
mod streaming;

pub use config::ClientConfig;

use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::ai::backend::ChatBackend;
use crate::ai::retry::with_retry;
use crate::ai::streaming::StreamPart;
use crate::ai::types::{ChatRequest, ModelInfo, ModelList};
use crate::error::ClientError;

/// HTTP client for the local inference server
#[derive(Debug, Clone)]
pub struct LocalServerClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl LocalServerClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `GET {server}/models`, retried on transient failures
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ClientError> {
        with_retry(&self.config.retry, "List models", || self.list_models_once()).await
    }

    async fn list_models_once(&self) -> Result<Vec<ModelInfo>, ClientError> {
        let timeout = self.config.models_timeout;
        let start = Instant::now();
        let response = self
            .http
            .get(self.config.models_url())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, timeout))?;
        let response = ensure_success_response(response, start, "Model list").await?;

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::from_reqwest(e, timeout))?;
        let list: ModelList =
            serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))?;
        debug!("Server lists {} models", list.data.len());
        Ok(list.data)
    }
}

#[async_trait]
impl ChatBackend for LocalServerClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ClientError> {
        LocalServerClient::list_models(self).await
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, ClientError> {
        self.call_streaming(request, cancel).await
    }
}

/// Map a non-2xx response to [`ClientError::Status`]
async fn ensure_success_response(
    response: reqwest::Response,
    call_start: Instant,
    label: &str,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    info!("{}: {} in {:?}", label, status, call_start.elapsed());

    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error!("{}: {} - {}", label, status, body);
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}
