//! HTTP retry policy with linear backoff.
//!
//! # Retry Policy
//!
//! - Max retries: 3 (4 total attempts)
//! - Delay before retry *n*: `n * base_delay` (1s, 2s, 3s by default)
//! - No jitter
//!
//! # Retryable Conditions
//!
//! - HTTP 5xx except 503
//! - Transport errors (connect, timeout, body send)
//!
//! Every other status, 503 included, is final on first sight.
//!
//! # Headers
//!
//! - `X-Trace-Id`: same across all attempts
//! - `X-Request-Id`: fresh per attempt

use std::time::Duration;

use portal_types::TraceId;
use reqwest::{RequestBuilder, Response, StatusCode};

use crate::headers::add_trace_headers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting initial request).
    pub max_retries: u32,
    /// Delay unit; retry *n* waits `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    /// One attempt, no retries.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Determine if a response status is retryable.
#[must_use]
pub fn should_retry(status: StatusCode) -> bool {
    status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE
}

/// Delay before the retry that follows failed `attempt` (1-based).
#[must_use]
pub fn retry_delay(attempt: u32, config: &RetryConfig) -> Duration {
    config.base_delay.saturating_mul(attempt)
}

/// Outcome of a retry operation.
///
/// Status classification is left to the caller: any HTTP answer, good or bad,
/// arrives as `Response`.
#[derive(Debug)]
pub enum RetryOutcome {
    /// The backend answered. Either a non-retryable status or the final attempt.
    Response(Response),
    /// Transport failure on the final attempt.
    Network {
        attempts: u32,
        source: reqwest::Error,
    },
    /// The request could not be built; retrying would not help.
    NonRetryable(reqwest::Error),
}

/// Send a request with automatic retries.
///
/// `build_request` is called once per attempt.
pub async fn send_with_retry<F>(
    build_request: F,
    trace_id: &TraceId,
    config: &RetryConfig,
) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let total_attempts = config.total_attempts();
    let mut attempt = 1;

    loop {
        let is_final = attempt >= total_attempts;
        let request = add_trace_headers(build_request(), trace_id);

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if is_final || !should_retry(status) {
                    return RetryOutcome::Response(response);
                }

                let delay = retry_delay(attempt, config);
                tracing::debug!(
                    status = %status,
                    attempt,
                    delay_ms = delay.as_millis(),
                    trace_id = %trace_id,
                    "Retrying request after error status"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if !is_retryable_error(&e) {
                    return RetryOutcome::NonRetryable(e);
                }
                if is_final {
                    return RetryOutcome::Network {
                        attempts: attempt,
                        source: e,
                    };
                }

                let delay = retry_delay(attempt, config);
                tracing::debug!(
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis(),
                    trace_id = %trace_id,
                    "Retrying request after connection error"
                );
                tokio::time::sleep(delay).await;
            }
        }

        attempt += 1;
    }
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    !error.is_builder()
}
