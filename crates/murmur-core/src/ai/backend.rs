//! Chat backend seam
//!
//! The session controller talks to the server through this trait so hosts
//! and tests can supply their own transport.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ai::streaming::StreamPart;
use crate::ai::types::{ChatRequest, ModelInfo};
use crate::error::ClientError;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Models the server currently serves
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ClientError>;

    /// Start a streamed completion. Parts arrive in network order; the
    /// stream stops early once `cancel` fires.
    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, ClientError>;
}
