pub mod embeddings;
pub mod generator;
pub mod retriever;

pub use embeddings::EmbeddingEncoder;
pub use generator::{AnswerGenerator, GenerationRequest};
pub use retriever::Retriever;
