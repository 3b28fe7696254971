//! Local LLM server layer
//!
//! Handles communication with an OpenAI-compatible local inference server:
//! wire types, SSE decoding, retry, and the HTTP client.

pub mod backend;
pub mod client;
pub mod parsers;
pub mod retry;
pub mod sse;
pub mod streaming;
pub mod types;

pub use backend::ChatBackend;
pub use client::{ClientConfig, LocalServerClient};
pub use streaming::StreamPart;
pub use types::{ChatMessage, ChatRequest, FinishReason, ModelInfo, Role};
