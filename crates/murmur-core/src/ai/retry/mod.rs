//! Retry logic
//!
//! Provides exponential backoff with jitter for transient failures talking to
//! the local server: connection refused while it starts up, timeouts and
//! server errors (429, 500, 502, 503, 504).
//!
//! Used for model listing and for opening the completion stream. A stream
//! that has already delivered text is never retried.

mod backoff;

pub use backoff::{delay_for_attempt, is_retryable_status, with_retry, IsRetryable, RetryConfig};
