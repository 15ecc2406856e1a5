//! HTTP client module with retry logic and error handling.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::{NonRetryableError, RetryPolicy, check_retryable, classify_status};
