//! Streaming lifecycle state
//!
//! One explicit phase enum instead of loose loading/streaming flags, and the
//! per-stream record the controller feeds the renderer from.

use tokio_util::sync::CancellationToken;

use crate::ai::streaming::StreamPart;
use crate::error::ClientError;
use crate::session::message::MessageId;

/// The session state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    /// No stream active
    #[default]
    Idle,
    /// Turn started, waiting for the first chunk
    UserMessageSubmitted,
    /// Receiving chunks
    Streaming,
    /// Terminal: the server finished the reply
    Completed,
    /// Terminal: the user stopped the reply
    Cancelled,
    /// Terminal: the stream failed
    Errored,
}

impl SessionPhase {
    /// Phase name for logs
    pub fn name(self) -> &'static str {
        match self {
            SessionPhase::Idle => "Idle",
            SessionPhase::UserMessageSubmitted => "UserMessageSubmitted",
            SessionPhase::Streaming => "Streaming",
            SessionPhase::Completed => "Completed",
            SessionPhase::Cancelled => "Cancelled",
            SessionPhase::Errored => "Errored",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Completed | SessionPhase::Cancelled | SessionPhase::Errored
        )
    }

    /// A turn is in flight
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            SessionPhase::UserMessageSubmitted | SessionPhase::Streaming
        )
    }
}

/// One reply being generated into a message version
#[derive(Debug)]
pub struct StreamSession {
    pub(crate) generation: u64,
    target: MessageId,
    version_index: usize,
    accumulated_text: String,
    active: bool,
    cancelled: bool,
    received_first_chunk: bool,
    cancel: CancellationToken,
}

impl StreamSession {
    pub(crate) fn new(generation: u64, target: MessageId, version_index: usize) -> Self {
        Self {
            generation,
            target,
            version_index,
            accumulated_text: String::new(),
            active: true,
            cancelled: false,
            received_first_chunk: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn target(&self) -> MessageId {
        self.target
    }

    /// Version of the target message this stream writes into
    pub fn version_index(&self) -> usize {
        self.version_index
    }

    /// Everything received so far
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record a chunk; returns true if it was the first one
    pub(crate) fn push(&mut self, delta: &str) -> bool {
        self.accumulated_text.push_str(delta);
        !std::mem::replace(&mut self.received_first_chunk, true)
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
    }

    /// Stop the network task and mark the stream cancelled
    pub(crate) fn cancel(&mut self) {
        self.cancel.cancel();
        self.cancelled = true;
        self.active = false;
    }
}

/// Message from a stream task to the session that owns it
#[derive(Debug)]
pub(crate) enum StreamUpdate {
    Part(StreamPart),
    /// The stream could not be opened
    OpenFailed(ClientError),
    /// The part channel closed
    Closed,
}
