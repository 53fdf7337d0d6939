use log::info;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::database::vector_index::{FlatIndex, IndexEntry, RetrievalResult, VectorSearch};
use crate::document::{Document, Embedding};
use crate::error::{resolve_top_k, RagError, RagResult};
use crate::llm::embeddings::EmbeddingEncoder;

/// Embeds queries and looks them up in the vector index.
pub struct Retriever {
    encoder: EmbeddingEncoder,
    index: Arc<dyn VectorSearch>,
    default_top_k: usize,
    query_cache: Option<Mutex<LruCache<String, Embedding>>>,
}

impl Retriever {
    pub fn new(encoder: EmbeddingEncoder, index: Arc<dyn VectorSearch>, default_top_k: usize) -> RagResult<Self> {
        if default_top_k == 0 {
            return Err(RagError::InvalidArgument("default top_k must be at least 1".to_string()));
        }
        if encoder.dimensions() != index.dimensions() {
            return Err(RagError::DimensionMismatch {
                expected: index.dimensions(),
                found: encoder.dimensions(),
            });
        }

        Ok(Self {
            encoder,
            index,
            default_top_k,
            query_cache: None,
        })
    }

    /// Encodes every document and builds an exact index over them.
    pub async fn build(encoder: EmbeddingEncoder, documents: Vec<Document>, default_top_k: usize) -> RagResult<Self> {
        if documents.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        info!("Building index from {} documents", documents.len());
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = encoder.encode(&texts).await?;

        let entries = documents
            .into_iter()
            .zip(embeddings)
            .map(|(document, embedding)| IndexEntry { document, embedding })
            .collect();
        let index = FlatIndex::build(entries)?;

        Self::new(encoder, Arc::new(index), default_top_k)
    }

    /// Keeps up to `capacity` query embeddings; zero disables the cache.
    pub fn with_query_cache(mut self, capacity: usize) -> Self {
        self.query_cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        self
    }

    pub async fn retrieve(&self, query: &str, k: Option<i64>) -> RagResult<RetrievalResult> {
        let k = resolve_top_k(k, self.default_top_k)?;
        info!("Retrieving top {} documents for query: '{}'", k, query);

        let query_vector = self.embed_query(query).await?;
        self.index.search(&query_vector, k)
    }

    async fn embed_query(&self, query: &str) -> RagResult<Embedding> {
        if let Some(hit) = self.cached_embedding(query) {
            return Ok(hit);
        }

        let embedding = self.encoder.encode_one(query).await?;

        if let Some(cache) = &self.query_cache {
            cache.lock().put(query.to_string(), embedding.clone());
        }
        Ok(embedding)
    }

    fn cached_embedding(&self, query: &str) -> Option<Embedding> {
        self.query_cache.as_ref()?.lock().get(query).cloned()
    }
}
