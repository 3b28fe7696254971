//! Chat messages and their versions

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai::types::Role;
use crate::error::SessionError;

/// Opaque message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One turn of the conversation.
///
/// `versions` is never empty and `current_version_index` always points into
/// it. Regenerating appends a version; nothing is ever overwritten except the
/// version a stream is writing into.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: MessageId,
    role: Role,
    versions: Vec<String>,
    /// Versions whose content is an error description rather than a reply
    failed: Vec<bool>,
    current_version_index: usize,
    created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: MessageId::new(),
            role,
            versions: vec![content],
            failed: vec![false],
            current_version_index: 0,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// Assistant message with one empty version, ready to stream into
    pub fn assistant() -> Self {
        Self::new(Role::Assistant, String::new())
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn current_version_index(&self) -> usize {
        self.current_version_index
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Text of the current version
    pub fn display_content(&self) -> &str {
        &self.versions[self.current_version_index]
    }

    /// Whether the current version holds an error description
    pub fn is_failed(&self) -> bool {
        self.failed[self.current_version_index]
    }

    /// Append an empty version and return its index
    pub(crate) fn push_version(&mut self) -> usize {
        self.versions.push(String::new());
        self.failed.push(false);
        self.versions.len() - 1
    }

    pub(crate) fn append_to_version(&mut self, index: usize, text: &str) {
        if let Some(version) = self.versions.get_mut(index) {
            version.push_str(text);
        }
    }

    /// Replace a version's content with an error description
    pub(crate) fn fail_version(&mut self, index: usize, description: String) {
        if let Some(version) = self.versions.get_mut(index) {
            *version = description;
            self.failed[index] = true;
        }
    }

    pub(crate) fn set_current_version(&mut self, index: usize) -> Result<(), SessionError> {
        if index >= self.versions.len() {
            return Err(SessionError::InvalidVersion {
                index,
                count: self.versions.len(),
            });
        }
        self.current_version_index = index;
        Ok(())
    }
}
