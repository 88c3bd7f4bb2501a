//! Shared request/retry helper for the OCR and title services.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpFailure {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
}

impl HttpFailure {
    fn is_retryable(&self) -> bool {
        match self {
            HttpFailure::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            HttpFailure::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            HttpFailure::InvalidJson(_) => false,
        }
    }
}

pub const DEFAULT_ATTEMPTS: u32 = 2;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const BODY_SNIPPET_LEN: usize = 300;

/// Sends the request built by `build` and parses the JSON body. Transient
/// failures are retried until `attempts` requests have been made, with
/// exponential backoff starting at one second.
pub async fn send_json_with_retry<F>(build: F, attempts: u32) -> Result<Value, HttpFailure>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match send_once(build()).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let delay = Duration::from_secs(1 << attempt);
                log::warn!(
                    "request failed ({e}), retrying in {}s (attempt {}/{})",
                    delay.as_secs(),
                    attempt + 2,
                    attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn send_once(request: RequestBuilder) -> Result<Value, HttpFailure> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(HttpFailure::Status {
            status,
            body: snippet(&body),
        });
    }

    serde_json::from_str(&body).map_err(|_| HttpFailure::InvalidJson(snippet(&body)))
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retry_policy() {
        let failure = |status| HttpFailure::Status {
            status,
            body: String::new(),
        };
        assert!(failure(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(failure(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!failure(StatusCode::UNAUTHORIZED).is_retryable());
        assert!(!HttpFailure::InvalidJson("<html>".into()).is_retryable());
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "标".repeat(BODY_SNIPPET_LEN + 10);
        assert_eq!(snippet(&long).chars().count(), BODY_SNIPPET_LEN);
    }
}
