//! HTTP client for a remote image generation server.
//!
//! The server exposes two endpoints:
//!
//! | Method | Path        | Body / Response                                         |
//! |--------|-------------|---------------------------------------------------------|
//! | GET    | `/ping`     | `{"status": "ready", "message": "..."}`                 |
//! | POST   | `/generate` | `{prompt, negative_prompt?, num_inference_steps}` -> raw image bytes |

use std::time::Duration;

use async_trait::async_trait;
use renderq_core::task::DEFAULT_MIME_TYPE;
use serde::Deserialize;

use crate::provider::{GeneratedImage, GenerationRequest, ImageProvider, ProviderError};

/// Error bodies longer than this are cut before being logged or stored.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Readiness payload returned by `GET /ping`.
#[derive(Debug, Deserialize)]
struct PingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for a single generation server.
#[derive(Debug)]
pub struct HttpImageProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpImageProvider {
    /// Create a client for the server at `base_url`, e.g.
    /// `http://gpu-1:8000`. A trailing slash is ignored.
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`]
    /// (connection pooling across several servers).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, ProviderError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        reqwest::Url::parse(trimmed).map_err(|e| ProviderError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            base_url: trimmed.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- private helpers ----

    /// Return the response unchanged on a 2xx status, otherwise an
    /// [`ProviderError::Api`] carrying the (truncated) body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ImageProvider for HttpImageProvider {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn ping(&self, timeout: Duration) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(format!("{}/ping", self.base_url))
            .timeout(timeout)
            .send()
            .await?;
        let ping: PingResponse = Self::ensure_success(response).await?.json().await?;

        if ping.status.eq_ignore_ascii_case("ready") {
            Ok(())
        } else {
            Err(ProviderError::NotReady(match ping.message {
                Some(message) => format!("{}: {message}", ping.status),
                None => ping.status,
            }))
        }
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<GeneratedImage, ProviderError> {
        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .timeout(timeout)
            .json(request)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        let data = response.bytes().await?.to_vec();

        Ok(GeneratedImage { data, mime_type })
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
