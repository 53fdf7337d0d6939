use log::{debug, error};
use std::sync::Arc;

use crate::document::Embedding;
use crate::error::{RagError, RagResult};
use crate::providers::traits::EmbeddingProvider;

/// Batching front for an embedding backend.
///
/// Every vector it hands out has exactly `dimensions()` components; a backend
/// that disagrees fails the whole call.
#[derive(Clone)]
pub struct EmbeddingEncoder {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
    batch_size: usize,
}

impl EmbeddingEncoder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let dimensions = provider.dimensions();
        let batch_size = provider.max_batch_size().max(1);
        Self {
            provider,
            dimensions,
            batch_size,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn encode(&self, texts: &[String]) -> RagResult<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!("Encoding batch {} ({} texts)", batch_no, batch.len());
            let vectors = self.provider.embed_batch(batch).await.map_err(|e| {
                error!("Embedding backend failed: {}", e);
                RagError::Encoding(e.to_string())
            })?;

            if vectors.len() != batch.len() {
                return Err(RagError::Encoding(format!(
                    "Backend returned {} embeddings for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
                return Err(RagError::Encoding(format!(
                    "Generated embedding has wrong size: {} (expected {})",
                    bad.len(),
                    self.dimensions
                )));
            }
            if vectors.iter().flatten().any(|v| !v.is_finite()) {
                return Err(RagError::Encoding(
                    "Backend returned an embedding with non-finite components".to_string(),
                ));
            }
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    pub async fn encode_one(&self, text: &str) -> RagResult<Embedding> {
        self.encode(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Encoding("Backend returned no embedding".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encodes each text as `[len, batch_call_index]`.
    struct CountingProvider {
        calls: AtomicUsize,
        batch_size: usize,
        fail_on_call: Option<usize>,
        dims_override: Option<usize>,
        poison: bool,
    }

    impl CountingProvider {
        fn new(batch_size: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                batch_size,
                fail_on_call: None,
                dims_override: None,
                poison: false,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(texts.len() <= self.batch_size);
            if self.fail_on_call == Some(call) {
                return Err(anyhow!("backend unavailable"));
            }
            let dims = self.dims_override.unwrap_or(2);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![t.len() as f32, call as f32];
                    v.resize(dims, 0.0);
                    if self.poison {
                        v[0] = f32::NAN;
                    }
                    v
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn max_batch_size(&self) -> usize {
            self.batch_size
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[tokio::test]
    async fn test_large_input_is_batched_in_order() {
        let provider = Arc::new(CountingProvider::new(4));
        let encoder = EmbeddingEncoder::new(provider.clone());

        let vectors = encoder.encode(&texts(10)).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(vectors.len(), 10);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], (i + 1) as f32);
            assert_eq!(v[1], (i / 4) as f32);
        }
    }

    #[tokio::test]
    async fn test_single_text() {
        let encoder = EmbeddingEncoder::new(Arc::new(CountingProvider::new(8)));
        let v = encoder.encode_one("abc").await.unwrap();
        assert_eq!(v, vec![3.0, 0.0]);
    }

    #[tokio::test]
    async fn test_failing_batch_fails_whole_call() {
        let mut provider = CountingProvider::new(2);
        provider.fail_on_call = Some(1);
        let encoder = EmbeddingEncoder::new(Arc::new(provider));

        let err = encoder.encode(&texts(5)).await.unwrap_err();
        assert!(matches!(err, RagError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_an_encoding_error() {
        let mut provider = CountingProvider::new(2);
        provider.dims_override = Some(3);
        let encoder = EmbeddingEncoder::new(Arc::new(provider));

        let err = encoder.encode(&texts(1)).await.unwrap_err();
        assert!(matches!(err, RagError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_non_finite_vector_is_an_encoding_error() {
        let mut provider = CountingProvider::new(2);
        provider.poison = true;
        let encoder = EmbeddingEncoder::new(Arc::new(provider));

        let err = encoder.encode(&texts(3)).await.unwrap_err();
        assert!(matches!(err, RagError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_empty_input_skips_backend() {
        let provider = Arc::new(CountingProvider::new(2));
        let encoder = EmbeddingEncoder::new(provider.clone());
        assert!(encoder.encode(&[]).await.unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
