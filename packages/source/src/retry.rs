//! Retry policy for page downloads and the single-shot JSON request helper
//! the fetchers build on.
//!
//! The unit of retry is one *fetch-and-store* step at a fixed offset: the
//! caller runs the step, and on failure asks [`RetryPolicy::backoff`] how
//! long to wait before trying the same offset again. State never advances
//! on a failed attempt, so a page is stored at most once.
//!
//! # Usage
//!
//! ```ignore
//! let policy = RetryPolicy::default();
//! for attempt in 1..=policy.max_attempts {
//!     match step(offset).await {
//!         Ok(v) => return Ok(v),
//!         Err(e) if attempt < policy.max_attempts => {
//!             tokio::time::sleep(policy.backoff(attempt)).await;
//!         }
//!         Err(e) => return Err(e),
//!     }
//! }
//! ```

use std::time::Duration;

use crate::SourceError;

/// Attempts per page before giving up.
pub const MAX_ATTEMPTS: u32 = 5;

/// Backoff grows by this much per failed attempt (5s, 10s, 15s, 20s).
pub const BACKOFF_UNIT: Duration = Duration::from_secs(5);

/// Pause between successful full pages.
pub const PAGE_DELAY: Duration = Duration::from_secs(1);

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// How often and how patiently a page is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per page, including the first.
    pub max_attempts: u32,
    /// Linear backoff unit.
    pub backoff_unit: Duration,
    /// Courtesy delay between successful full pages.
    pub page_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff_unit: BACKOFF_UNIT,
            page_delay: PAGE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps. Used by tests and dry runs.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_unit: Duration::ZERO,
            page_delay: Duration::ZERO,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }

    /// Whether another attempt is allowed after `attempt` failures.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Sends a request once and parses the response body as JSON.
///
/// Non-success statuses become [`SourceError::Status`]. A body that is not
/// valid JSON is logged with a preview and returned as
/// [`SourceError::Json`]. Retrying is left to the caller's
/// [`RetryPolicy`].
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails, the status is not 2xx,
/// or the body is not JSON.
pub async fn send_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, SourceError> {
    let response = request.send().await?;

    let url = response.url().to_string();
    let status = response.status();
    if !status.is_success() {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            log::warn!("HTTP 429 (rate limited): {url}");
        } else if status.is_server_error() {
            log::warn!("HTTP {status} (server error): {url}");
        }
        return Err(SourceError::Status { status, url });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        let preview = if text.len() > BODY_PREVIEW_LEN {
            let mut end = BODY_PREVIEW_LEN;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &text[..end])
        } else {
            text.clone()
        };
        log::error!(
            "JSON parse failed.\n  \
             url: {url}\n  \
             status: {status}\n  \
             content-type: {content_type:?}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {preview}",
            text.len(),
        );
        SourceError::Json(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_is_linear_in_five_second_steps() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..MAX_ATTEMPTS)
            .map(|a| policy.backoff(a).as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 15, 20]);
    }

    #[test]
    fn retries_until_attempt_cap() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.backoff(2), Duration::ZERO);
        assert_eq!(policy.page_delay, Duration::ZERO);
        assert!(!policy.should_retry(3));
    }
}
