use anyhow::Result;
use async_trait::async_trait;

/// Sampling controls passed to every completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 0.7,
        }
    }
}

/// A text-generation backend.
///
/// Implementations return the full generated text *including* the echoed
/// prompt, the way a local text-generation pipeline does. Answer extraction
/// relies on the prompt's closing marker being present in that text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// A text-embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds at most `max_batch_size()` texts in one backend call.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    fn max_batch_size(&self) -> usize;
}
