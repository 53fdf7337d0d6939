use std::time::Duration;
use thiserror::Error;

/// Every failure the answer pipeline can surface to its caller.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Malformed record at position {position} ({id}): missing field '{field}'")]
    MalformedRecord {
        position: usize,
        id: String,
        field: String,
    },
    #[error("Corpus source error: {0}")]
    CorpusSource(String),
    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,
    #[error("Dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Generation error: {0}")]
    Generation(String),
    #[error("Generation format error: {0}")]
    GenerationFormat(String),
    #[error("Generation timed out after {0:?}")]
    GenerationTimeout(Duration),
}

pub type RagResult<T> = Result<T, RagError>;

/// Validates a caller supplied `top_k`, falling back to `default` when absent.
pub fn resolve_top_k(k: Option<i64>, default: usize) -> RagResult<usize> {
    match k {
        None => Ok(default),
        Some(k) if k <= 0 => Err(RagError::InvalidArgument(format!(
            "top_k must be at least 1, got {}",
            k
        ))),
        Some(k) => Ok(k as usize),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_top_k() {
        assert_eq!(resolve_top_k(None, 3).unwrap(), 3);
        assert_eq!(resolve_top_k(Some(7), 3).unwrap(), 7);
        assert!(matches!(resolve_top_k(Some(0), 3), Err(RagError::InvalidArgument(_))));
        assert!(matches!(resolve_top_k(Some(-2), 3), Err(RagError::InvalidArgument(_))));
    }
}
