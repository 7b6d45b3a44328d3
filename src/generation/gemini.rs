//! Google Gemini backend over the public REST API.
//!
//! Gemini supports explicit context caching (`cachedContents`), which lets a
//! long transcript be uploaded once and referenced by every question.

use super::{classify_status, classify_transport, parse_retry_after, GenerateRequest, Generator};
use crate::cache::RemoteCacheHandle;
use crate::config::GenerationSettings;
use crate::error::{AskvidError, Result};
use crate::openai::http_client;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Environment variable holding the Gemini API key.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Generator backed by the Gemini `generateContent` API.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn user(text: &'a str) -> Self {
        Self {
            role: Some("user"),
            parts: vec![Part { text }],
        }
    }

    fn system(text: &'a str) -> Self {
        Self {
            role: None,
            parts: vec![Part { text }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_content: Option<&'a str>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCachedContentRequest<'a> {
    model: String,
    display_name: &'a str,
    contents: Vec<Content<'a>>,
    ttl: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedContentResponse {
    name: String,
    expire_time: Option<DateTime<Utc>>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: usize,
}

impl GeminiGenerator {
    /// Create a generator using the key from `GEMINI_API_KEY`.
    pub fn from_env(settings: &GenerationSettings, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var(API_KEY_VAR)
            .map_err(|_| AskvidError::Config(format!("{} is not set", API_KEY_VAR)))?;
        Self::new(settings, api_key, timeout)
    }

    pub fn new(settings: &GenerationSettings, api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: settings.gemini_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        })
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(
            response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(classify_status(status, retry_after, &body))
    }
}

/// Request body for `generateContent`.
///
/// A cached transcript request cannot also carry a system instruction, so
/// the system text is folded into the user turn instead.
fn generate_body<'a>(
    request: &'a GenerateRequest,
    merged_prompt: &'a str,
    config: GenerationConfig,
) -> GenerateContentRequest<'a> {
    match request.remote_cache_id.as_deref() {
        Some(cache_id) => GenerateContentRequest {
            contents: vec![Content::user(merged_prompt)],
            system_instruction: None,
            cached_content: Some(cache_id),
            generation_config: config,
        },
        None => GenerateContentRequest {
            contents: vec![Content::user(&request.prompt)],
            system_instruction: Some(Content::system(&request.system)),
            cached_content: None,
            generation_config: config,
        },
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip(self, request), fields(model = %self.model, cached = request.remote_cache_id.is_some()))]
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let merged_prompt = format!("{}\n\n{}", request.system, request.prompt);
        let body = generate_body(
            request,
            &merged_prompt,
            GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        );

        let url = format!("{}/{}:generateContent", self.base_url, self.model_path());
        let response: GenerateContentResponse = self
            .post(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| AskvidError::TransientApiFailure(format!("Unreadable response: {}", e)))?;

        let answer = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
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

    #[instrument(skip(self, content), fields(chars = content.len()))]
    async fn create_cache(
        &self,
        video_id: &str,
        content: &str,
        ttl: Duration,
    ) -> Result<RemoteCacheHandle> {
        let body = CreateCachedContentRequest {
            model: self.model_path(),
            display_name: video_id,
            contents: vec![Content::user(content)],
            ttl: format!("{}s", ttl.as_secs()),
        };

        let url = format!("{}/cachedContents", self.base_url);
        let created: CachedContentResponse = self
            .post(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| AskvidError::TransientApiFailure(format!("Unreadable response: {}", e)))?;

        let fallback_expiry = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));

        info!("Gemini cached content {} created", created.name);

        Ok(RemoteCacheHandle {
            video_id: video_id.to_string(),
            remote_cache_id: created.name,
            expiry_time: created.expire_time.unwrap_or(fallback_expiry),
            token_count: created
                .usage_metadata
                .map(|u| u.total_token_count)
                .unwrap_or_else(|| crate::transcript::estimate_tokens(content)),
        })
    }
}
