//! Utility modules.

pub mod retry;
pub mod text;

pub use retry::{RetryConfig, RetryResult, Retryable, with_retry, with_retry_if};
pub use text::{json_escaped_len, json_string_len, truncate_chars};
