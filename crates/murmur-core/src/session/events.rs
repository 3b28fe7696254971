//! Notifications from the session to its host

use crate::markdown::RenderOutput;
use crate::session::message::MessageId;
use crate::session::stream::SessionPhase;

/// Reachability of the local server as last observed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Unknown,
    Connected {
        models: Vec<String>,
    },
    Failure {
        message: String,
    },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

/// Emitted after every session mutation, in mutation order
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A message was appended to the list
    MessageAdded { id: MessageId },
    /// A message's displayed content was re-rendered
    MessageRendered { id: MessageId, output: RenderOutput },
    /// A message's current version changed
    VersionChanged { id: MessageId, index: usize },
    PhaseChanged { phase: SessionPhase },
    ConnectionChanged { status: ConnectionStatus },
    ModelSelected { model: String },
    /// A stream ended with an error; the message holds its description
    StreamFailed { id: MessageId, error: String },
    /// Every message was removed
    Cleared,
}
