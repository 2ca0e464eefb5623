//! Shared HTTP plumbing for OpenAI-compatible endpoints.
//!
//! Both the embeddings client and the chat-completions client POST JSON with
//! a bearer token and retry with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately, body preserved
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Resolve the API base URL: explicit config, then `OPENAI_BASE_URL`, then
/// the public endpoint.
pub(crate) fn base_url(configured: Option<&str>) -> String {
    let url = configured
        .map(str::to_string)
        .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    url.trim_end_matches('/').to_string()
}

pub(crate) fn api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
}

#[derive(Debug)]
pub(crate) enum RequestFailure {
    /// A non-retryable client error. The body is kept so callers can
    /// classify it.
    Rejected { status: StatusCode, body: String },
    /// Retries exhausted, or the response could not be decoded.
    Failed(String),
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestFailure::Rejected { status, body } => {
                write!(f, "API error {}: {}", status, body)
            }
            RequestFailure::Failed(msg) => f.write_str(msg),
        }
    }
}

pub(crate) struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAiClient {
    pub(crate) fn new(
        base_url: String,
        api_key: String,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            max_retries,
        })
    }

    /// POST `body` to `{base_url}/{path}` and return the decoded JSON reply.
    pub(crate) async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, RequestFailure> {
        let url = format!("{}/{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, url = %url, "retrying request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .map_err(|e| RequestFailure::Failed(format!("invalid response: {}", e)));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_err = Some(format!("API error {}: {}", status, body_text));
                        continue;
                    }

                    return Err(RequestFailure::Rejected {
                        status,
                        body: body_text,
                    });
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(RequestFailure::Failed(
            last_err.unwrap_or_else(|| "request failed after retries".to_string()),
        ))
    }
}
