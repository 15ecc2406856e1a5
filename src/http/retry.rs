//! Retry policy for network operations and classification of HTTP failures.

use reqwest::StatusCode;
use std::time::Duration;

/// Maximum number of attempts for network operations.
pub const MAX_RETRIES: usize = 3;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Same attempt count without waiting between attempts.
    pub fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Errors that should not be retried.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 429, or 403 carrying a rate limit message
    RateLimitExceeded(String),
    /// HTTP 401
    AuthenticationFailed(String),
    /// HTTP 404
    NotFound(String),
    /// HTTP 403 for any other reason
    Forbidden(String),
    /// Any other 4xx
    ClientError(String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::RateLimitExceeded(url) => write!(
                f,
                "Rate limit exceeded fetching {}. Try again later or set GITHUB_TOKEN.",
                url
            ),
            NonRetryableError::AuthenticationFailed(url) => {
                write!(f, "Authentication failed fetching {}. Check GITHUB_TOKEN.", url)
            }
            NonRetryableError::NotFound(url) => {
                write!(f, "Not found: {} (is the formula version published?)", url)
            }
            NonRetryableError::Forbidden(url) => write!(f, "Access forbidden: {}", url),
            NonRetryableError::ClientError(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Classifies a response status. `Ok(())` means the failure is worth retrying.
pub fn classify_status(
    status: StatusCode,
    url: &str,
    message: &str,
) -> Result<(), NonRetryableError> {
    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(url.to_string())),
        StatusCode::FORBIDDEN if message.contains("rate limit") => {
            Err(NonRetryableError::RateLimitExceeded(url.to_string()))
        }
        StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(url.to_string())),
        StatusCode::TOO_MANY_REQUESTS => {
            Err(NonRetryableError::RateLimitExceeded(url.to_string()))
        }
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(url.to_string())),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} from {}",
            s.as_u16(),
            url
        ))),
        // 5xx and anything unexpected
        _ => Ok(()),
    }
}

/// Converts an error from `error_for_status()` into an `anyhow::Error`,
/// turning non-retryable statuses into [`NonRetryableError`].
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    let Some(status) = error.status() else {
        // Connection errors, timeouts, etc. are retryable
        return anyhow::Error::from(error);
    };
    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "<unknown url>".to_string());

    match classify_status(status, &url, &error.to_string()) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
