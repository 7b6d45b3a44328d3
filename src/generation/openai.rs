//! OpenAI chat completions backend.

use super::{GenerateRequest, Generator};
use crate::cache::RemoteCacheHandle;
use crate::config::GenerationSettings;
use crate::error::{AskvidError, Result};
use crate::openai::create_client_with_config;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Generator backed by OpenAI chat completions.
///
/// OpenAI has no explicit transcript cache, so every prompt inlines the
/// transcript and `create_cache` always fails.
pub struct OpenAIGenerator {
    client: async_openai::Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl OpenAIGenerator {
    pub fn new(settings: &GenerationSettings, timeout: Duration) -> Result<Self> {
        Self::with_config(settings, OpenAIConfig::default(), timeout)
    }

    /// Create a generator against a specific endpoint and key.
    ///
    /// Rate-limit responses are returned after one request; retrying them is
    /// the dispatcher's job.
    pub fn with_config(
        settings: &GenerationSettings,
        config: OpenAIConfig,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: create_client_with_config(config, timeout)?,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        })
    }
}

fn build_error(e: OpenAIError) -> AskvidError {
    AskvidError::InvalidRequest(format!("Failed to build request: {}", e))
}

/// Classify an OpenAI client error for the dispatcher.
fn classify(err: OpenAIError) -> AskvidError {
    match err {
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().unwrap_or_default();
            let code = api.code.as_deref().unwrap_or_default();
            let message = api.message;
            if kind == "insufficient_quota" || code == "insufficient_quota" {
                AskvidError::AuthFailure(message)
            } else if kind.contains("rate_limit")
                || code == "rate_limit_exceeded"
                || message.to_lowercase().contains("rate limit")
            {
                AskvidError::RateLimitExceeded { retry_after: None }
            } else if kind.contains("authentication") || message.contains("API key") {
                AskvidError::AuthFailure(message)
            } else if kind == "invalid_request_error" {
                AskvidError::InvalidRequest(message)
            } else {
                AskvidError::TransientApiFailure(message)
            }
        }
        OpenAIError::Reqwest(e) => super::classify_transport(e),
        OpenAIError::InvalidArgument(message) => AskvidError::InvalidRequest(message),
        other => AskvidError::TransientApiFailure(other.to_string()),
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.clone())
                .build()
                .map_err(build_error)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt.clone())
                .build()
                .map_err(build_error)?
                .into(),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_output_tokens)
            .build()
            .map_err(build_error)?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(classify)?;

        let answer = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        if answer.is_empty() {
            return Err(AskvidError::TransientApiFailure(
                "Empty response from model".to_string(),
            ));
        }

        debug!("Generated {} characters", answer.len());
        Ok(answer)
    }

    async fn create_cache(
        &self,
        video_id: &str,
        _content: &str,
        _ttl: Duration,
    ) -> Result<RemoteCacheHandle> {
        Err(AskvidError::InvalidRequest(format!(
            "OpenAI does not support explicit transcript caches (video {})",
            video_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatcher, RateBudget, RetryPolicy};
    use async_openai::error::ApiError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn api_error(kind: &str, message: &str) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: Some(kind.to_string()),
            param: None,
            code: None,
        })
    }

    #[test]
    fn test_classify_api_errors() {
        assert!(matches!(
            classify(api_error("invalid_request_error", "Incorrect API key provided")),
            AskvidError::AuthFailure(_)
        ));
        assert!(matches!(
            classify(api_error("requests", "Rate limit reached for gpt-4o-mini")),
            AskvidError::RateLimitExceeded { .. }
        ));
        assert!(matches!(
            classify(api_error("invalid_request_error", "max_tokens is too large")),
            AskvidError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify(api_error("server_error", "The server had an error")),
            AskvidError::TransientApiFailure(_)
        ));
    }

    #[test]
    fn test_quota_and_rate_limit_codes() {
        let quota = OpenAIError::ApiError(ApiError {
            message: "You exceeded your current quota".to_string(),
            r#type: Some("insufficient_quota".to_string()),
            param: None,
            code: Some("insufficient_quota".to_string()),
        });
        assert!(matches!(classify(quota), AskvidError::AuthFailure(_)));

        let limited = OpenAIError::ApiError(ApiError {
            message: "Too many requests".to_string(),
            r#type: Some("requests".to_string()),
            param: None,
            code: Some("rate_limit_exceeded".to_string()),
        });
        assert!(matches!(classify(limited), AskvidError::RateLimitExceeded { .. }));
    }

    fn rate_limited_body() -> String {
        r#"{"error":{"message":"Rate limit reached for requests","type":"requests","param":null,"code":"rate_limit_exceeded"}}"#
            .to_string()
    }

    fn completion_body(answer: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000u32,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": answer},
                "finish_reason": "stop"
            }]
        })
        .to_string()
    }

    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    /// Serve the given `(status, body)` responses in order, one per connection.
    async fn serve_responses(responses: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);

        tokio::spawn(async move {
            let mut responses = responses.into_iter();
            while let Ok((mut stream, _)) = listener.accept().await {
                read_request(&mut stream).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses.next().unwrap_or((500, String::new()));
                let reason = match status {
                    200 => "OK",
                    429 => "Too Many Requests",
                    _ => "Internal Server Error",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{}/v1", addr), requests)
    }

    fn generator_for(api_base: &str) -> Arc<dyn Generator> {
        let config = OpenAIConfig::new()
            .with_api_base(api_base)
            .with_api_key("test-key");
        Arc::new(
            OpenAIGenerator::with_config(&GenerationSettings::default(), config, Duration::from_secs(5))
                .unwrap(),
        )
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            system: "Be brief.".to_string(),
            prompt: "Question: hi?".to_string(),
            remote_cache_id: None,
        }
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_after_one_request() {
        let (api_base, requests) =
            serve_responses(vec![(429, rate_limited_body()), (200, completion_body("hello"))]).await;
        let budget = Arc::new(RateBudget::new(1, Duration::from_secs(3600)));
        let dispatcher = Dispatcher::new(generator_for(&api_base), Arc::clone(&budget), policy(0), 1);

        let result = dispatcher.dispatch(request()).await;

        match result {
            Err(AskvidError::DispatchFailed { attempts, last }) => {
                assert_eq!(attempts, 1);
                assert!(matches!(*last, AskvidError::RateLimitExceeded { .. }));
            }
            other => panic!("expected DispatchFailed, got {:?}", other),
        }
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert_eq!(budget.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_each_rate_limit_retry_takes_a_budget_slot() {
        let (api_base, requests) = serve_responses(vec![
            (429, rate_limited_body()),
            (429, rate_limited_body()),
            (200, completion_body("hello")),
        ])
        .await;
        let budget = Arc::new(RateBudget::new(3, Duration::from_secs(3600)));
        let dispatcher = Dispatcher::new(generator_for(&api_base), Arc::clone(&budget), policy(2), 1);

        let answer = dispatcher.dispatch(request()).await.unwrap();

        assert_eq!(answer, "hello");
        assert_eq!(requests.load(Ordering::SeqCst), 3);
        assert_eq!(budget.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_create_cache_is_unsupported() {
        let generator = OpenAIGenerator::new(&GenerationSettings::default(), Duration::from_secs(5)).unwrap();
        let result = generator
            .create_cache("vid", "transcript", Duration::from_secs(60))
            .await;
        assert!(matches!(result, Err(AskvidError::InvalidRequest(_))));
        assert_eq!(generator.name(), "openai");
    }
}
