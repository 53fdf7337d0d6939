use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{CreateCompletionRequestArgs, CreateEmbeddingRequestArgs},
    Client,
};
use async_trait::async_trait;
use log::debug;

use crate::providers::traits::{CompletionProvider, EmbeddingProvider, GenerationParams};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible backend for both embeddings and raw completions.
///
/// Completions are requested with `echo` so the prompt comes back in front of
/// the generated text; self-hosted servers (vLLM, llama.cpp) support this too.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    completion_model: String,
    embedding_model: String,
    dimensions: usize,
    batch_size: usize,
}

impl OpenAIProvider {
    pub fn new(api_key: &str, api_base: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base.trim_end_matches('/'));

        Self {
            client: Client::with_config(config),
            completion_model: "gpt-3.5-turbo-instruct".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 64,
        }
    }

    pub fn with_completion_model(mut self, model: impl Into<String>) -> Self {
        self.completion_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>, dimensions: usize, batch_size: usize) -> Self {
        self.embedding_model = model.into();
        self.dimensions = dimensions;
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = CreateCompletionRequestArgs::default()
            .model(&self.completion_model)
            .prompt(prompt)
            .max_tokens(u16::try_from(params.max_new_tokens).unwrap_or(u16::MAX))
            .temperature(params.temperature)
            .echo(true)
            .build()?;

        let response = self.client.completions().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| anyhow!("No completion returned from {}", self.completion_model))
    }

    fn model_name(&self) -> &str {
        &self.completion_model
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(texts.to_vec())
            .build()?;

        let mut response = self.client.embeddings().create(request).await?;
        response.data.sort_by_key(|embedding| embedding.index);
        debug!(
            "Embedded {} texts with {}",
            response.data.len(),
            self.embedding_model
        );

        Ok(response
            .data
            .into_iter()
            .map(|embedding| embedding.embedding)
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }
}
