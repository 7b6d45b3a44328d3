//! OpenAI question embeddings.

use super::Embedder;
use crate::config::EmbeddingSettings;
use crate::error::{AskvidError, Result};
use crate::openai::create_client_with_timeout;
use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateEmbeddingRequest, CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Inputs per embeddings call.
const MAX_INPUTS_PER_REQUEST: usize = 100;

/// Embeds questions with the OpenAI embeddings endpoint.
pub struct OpenAIEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbedder {
    pub fn new(settings: &EmbeddingSettings, timeout: Duration) -> Result<Self> {
        if settings.dimensions == 0 {
            return Err(AskvidError::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            client: create_client_with_timeout(timeout)?,
            model: settings.model.clone(),
            dimensions: settings.dimensions as usize,
        })
    }

    fn build_request(&self, inputs: &[String]) -> Result<CreateEmbeddingRequest> {
        CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(inputs.to_vec()))
            .dimensions(self.dimensions as u32)
            .build()
            .map_err(|e| AskvidError::Embedding(format!("Failed to build request: {}", e)))
    }

    /// Embed one request's worth of inputs, in input order.
    async fn embed_group(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .embeddings()
            .create(self.build_request(inputs)?)
            .await
            .map_err(|e| AskvidError::Embedding(format!("Embedding API error: {}", e)))?;

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        if data.len() != inputs.len() {
            return Err(AskvidError::Embedding(format!(
                "Expected {} embeddings, got {}",
                inputs.len(),
                data.len()
            )));
        }

        data.into_iter()
            .map(|e| {
                if e.embedding.len() == self.dimensions {
                    Ok(e.embedding)
                } else {
                    Err(AskvidError::Embedding(format!(
                        "Expected {} dimensions, got {}",
                        self.dimensions,
                        e.embedding.len()
                    )))
                }
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AskvidError::Embedding("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(AskvidError::Embedding("Cannot embed empty text".to_string()));
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for group in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            embeddings.extend(self.embed_group(group).await?);
        }

        debug!("Embedded {} questions with {}", embeddings.len(), self.model);
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
