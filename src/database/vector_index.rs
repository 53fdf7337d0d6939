use log::info;
use serde::Serialize;

use crate::document::{Document, Embedding};
use crate::error::{RagError, RagResult};

/// A document paired with the embedding it was indexed under.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub document: Document,
    pub embedding: Embedding,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub distance: f32,
}

/// Nearest first, at most `k` entries long.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredDocument>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn texts(&self) -> Vec<String> {
        self.hits.iter().map(|hit| hit.document.text.clone()).collect()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.hits.iter().map(|hit| &hit.document)
    }

    pub fn distances(&self) -> Vec<f32> {
        self.hits.iter().map(|hit| hit.distance).collect()
    }
}

/// k-nearest-neighbour lookup over a fixed set of entries.
pub trait VectorSearch: Send + Sync {
    fn search(&self, query: &[f32], k: usize) -> RagResult<RetrievalResult>;

    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact brute-force index using Euclidean distance.
#[derive(Debug)]
pub struct FlatIndex {
    entries: Vec<IndexEntry>,
    dimensions: usize,
}

impl FlatIndex {
    pub fn build(entries: Vec<IndexEntry>) -> RagResult<Self> {
        let dimensions = entries
            .first()
            .map(|entry| entry.embedding.len())
            .ok_or(RagError::EmptyCorpus)?;

        if dimensions == 0 {
            return Err(RagError::DimensionMismatch {
                expected: 1,
                found: 0,
            });
        }

        if let Some(bad) = entries.iter().find(|entry| entry.embedding.len() != dimensions) {
            return Err(RagError::DimensionMismatch {
                expected: dimensions,
                found: bad.embedding.len(),
            });
        }

        info!("Built vector index with {} entries ({}d)", entries.len(), dimensions);
        Ok(Self { entries, dimensions })
    }
}

impl VectorSearch for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> RagResult<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be at least 1".to_string()));
        }
        if query.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                found: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, euclidean_distance(query, &entry.embedding)))
            .collect();

        // Stable sort keeps insertion order among equal distances; NaN sorts last.
        scored.sort_by(|a, b| match (a.1.is_nan(), b.1.is_nan()) {
            (false, false) => a.1.total_cmp(&b.1),
            (a_nan, b_nan) => a_nan.cmp(&b_nan),
        });
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|(position, distance)| ScoredDocument {
                document: self.entries[position].document.clone(),
                distance,
            })
            .collect();

        Ok(RetrievalResult { hits })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
