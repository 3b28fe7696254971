//! Murmur core library
//!
//! Shared functionality for Murmur hosts:
//! - Local LLM server client (model listing, streamed chat completions)
//! - Chat session controller with streaming lifecycle and reply versions
//! - Incremental streaming-markdown renderer (stable/volatile split,
//!   safety oracle, block classifier, syntax highlighting)

pub mod ai;
pub mod config;
pub mod constants;
pub mod error;
pub mod markdown;
pub mod paths;
pub mod session;

pub use config::ChatConfig;
pub use error::{ClientError, ConfigError, RenderError, SessionError};
pub use markdown::{
    is_safe_boundary, split, to_blocks, ClipboardSink, DisplayInstruction, RenderConfig,
    RenderOutput, RenderPipeline, RenderState,
};
pub use session::{ChatSession, ConnectionStatus, Message, MessageId, SessionEvent, SessionPhase};
