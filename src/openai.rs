//! HTTP client construction shared by the OpenAI and Gemini backends.

use crate::error::Result;
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for model API requests (2 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Build a reqwest client with the given request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Backoff that never retries. Every 429 surfaces to the caller, so each
/// HTTP request goes through the dispatcher's rate budget.
fn no_retry_backoff() -> backoff::ExponentialBackoff {
    backoff::ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

/// Create an OpenAI client with a custom timeout.
///
/// The API key is read from `OPENAI_API_KEY` by `OpenAIConfig::default()`.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    create_client_with_config(OpenAIConfig::default(), timeout)
}

/// Create an OpenAI client for the given config, without client-side retries.
pub fn create_client_with_config(
    config: OpenAIConfig,
    timeout: Duration,
) -> Result<Client<OpenAIConfig>> {
    Ok(Client::with_config(config)
        .with_http_client(http_client(timeout)?)
        .with_backoff(no_retry_backoff()))
}
