pub mod local;
pub mod openai;
pub mod tgi;
pub mod traits;

pub use local::local::{HashingEmbedder, OfflineProvider};
pub use openai::openai::OpenAIProvider;
pub use tgi::tgi::TgiProvider;
pub use traits::{CompletionProvider, EmbeddingProvider, GenerationParams};
