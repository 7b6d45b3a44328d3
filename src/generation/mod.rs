//! Answer-generation backends.

mod gemini;
mod openai;

pub use gemini::GeminiGenerator;
pub use openai::OpenAIGenerator;

use crate::cache::RemoteCacheHandle;
use crate::config::{GenerationProvider, GenerationSettings};
use crate::error::{AskvidError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// One prompt to send to the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    pub system: String,
    pub prompt: String,
    /// Server-side cached transcript to answer against, if any.
    pub remote_cache_id: Option<String>,
}

/// Trait for language-model backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Generate an answer. An empty answer is reported as a transient failure.
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;

    /// Upload transcript content to a server-side cache.
    async fn create_cache(
        &self,
        video_id: &str,
        content: &str,
        ttl: Duration,
    ) -> Result<RemoteCacheHandle>;
}

/// Build the configured backend.
pub fn create_generator(settings: &GenerationSettings) -> Result<Arc<dyn Generator>> {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    match settings.provider {
        GenerationProvider::OpenAI => Ok(Arc::new(OpenAIGenerator::new(settings, timeout)?)),
        GenerationProvider::Gemini => Ok(Arc::new(GeminiGenerator::from_env(settings, timeout)?)),
    }
}

/// Map an unsuccessful HTTP status to the dispatcher's error taxonomy.
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> AskvidError {
    let detail = format!("{}: {}", status, body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AskvidError::AuthFailure(detail),
        StatusCode::TOO_MANY_REQUESTS => AskvidError::RateLimitExceeded { retry_after },
        StatusCode::REQUEST_TIMEOUT => AskvidError::TransientApiFailure(detail),
        s if s.is_server_error() => AskvidError::TransientApiFailure(detail),
        _ => AskvidError::InvalidRequest(detail),
    }
}

/// Map a transport-level failure (no HTTP status) to the error taxonomy.
pub(crate) fn classify_transport(err: reqwest::Error) -> AskvidError {
    match err.status() {
        Some(status) => classify_status(status, None, &err.to_string()),
        None => AskvidError::TransientApiFailure(err.to_string()),
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}
