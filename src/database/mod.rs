pub mod vector_index;

pub use vector_index::{FlatIndex, IndexEntry, RetrievalResult, ScoredDocument, VectorSearch};
