//! Error types for the core seams
//!
//! Each layer owns an enum; nothing here is fatal to a host. Connectivity
//! failures degrade into a connection status, render failures into an
//! escaped plain-text fallback.

use std::time::Duration;

use thiserror::Error;

/// Failures talking to the local inference server
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server unreachable: {0}")]
    Connect(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("server error ({kind}): {message}")]
    Api { kind: String, message: String },
    #[error("stream read failed: {0}")]
    Stream(String),
}

impl ClientError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connect(_) | ClientError::Timeout(_) => true,
            ClientError::Status { status, .. } => {
                crate::ai::retry::is_retryable_status(*status)
            }
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(timeout)
        } else if err.is_connect() || err.is_request() {
            ClientError::Connect(err.to_string())
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Stream(err.to_string())
        }
    }
}

/// Failures inside the markdown pipeline, always caught at its boundary
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("input of {len} characters exceeds the {limit} character render limit")]
    InputTooLarge { len: usize, limit: usize },
    #[error("syntax highlighting failed: {0}")]
    Highlight(String),
    #[error("incremental patch not applicable: {0}")]
    Patch(String),
    #[error("no code block {index} in this message")]
    UnknownCodeBlock { index: usize },
    #[error("clipboard write failed: {0}")]
    Clipboard(String),
}

/// Invalid host requests against the chat session
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown message {0}")]
    UnknownMessage(String),
    #[error("version {index} out of range (message has {count} versions)")]
    InvalidVersion { index: usize, count: usize },
    #[error("only completed assistant messages can be regenerated")]
    NotRegenerable,
    #[error("message is still streaming")]
    Busy,
    #[error("message text is empty")]
    EmptyInput,
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Connect("refused".into()).is_retryable());
        assert!(ClientError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(ClientError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Status {
            status: 404,
            body: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Decode("bad json".into()).is_retryable());
    }
}
