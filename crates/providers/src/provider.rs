//! The capability every image generation backend exposes.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

/// Errors from a provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },

    /// The provider answered but reported it cannot serve requests yet.
    #[error("Provider not ready: {0}")]
    NotReady(String),

    /// The call did not finish within its deadline.
    #[error("Provider call timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The configured base URL could not be parsed.
    #[error("Invalid provider URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Input for one image generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(rename = "num_inference_steps")]
    pub steps: u32,
}

impl GenerationRequest {
    /// A request for `prompt` with the default step count.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            steps: renderq_core::dispatch::DEFAULT_INFERENCE_STEPS,
        }
    }
}

/// Output of a successful generation.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// A remote backend capable of image generation.
///
/// Implementations must honour the supplied timeouts; callers additionally
/// bound every call with [`call_with_deadline`].
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Human-readable name used in logs and stats (usually the base URL).
    fn name(&self) -> &str;

    /// Cheap readiness probe.
    async fn ping(&self, timeout: Duration) -> Result<(), ProviderError>;

    /// Generate one image.
    async fn generate(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<GeneratedImage, ProviderError>;
}

/// Run a provider future with a hard deadline, mapping expiry to
/// [`ProviderError::Timeout`].
pub async fn call_with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(deadline)),
    }
}
