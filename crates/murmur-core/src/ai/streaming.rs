//! Stream parts delivered from the network task to the session

use crate::ai::types::FinishReason;

/// One item on the channel returned by a streaming chat call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPart {
    /// Next piece of reply text, always whole UTF-8 characters
    TextDelta { delta: String },
    /// Stream ended normally
    Finish { reason: FinishReason },
    /// Stream ended with an error; no further parts follow
    Error { error: String },
}
