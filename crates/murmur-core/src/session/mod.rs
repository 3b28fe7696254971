//! Chat session: message list, streaming lifecycle and reply versions

pub mod controller;
pub mod events;
pub mod message;
pub mod stream;

pub use controller::ChatSession;
pub use events::{ConnectionStatus, SessionEvent};
pub use message::{Message, MessageId};
pub use stream::{SessionPhase, StreamSession};
