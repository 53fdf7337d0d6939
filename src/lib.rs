pub mod api;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod food;
pub mod llm;
pub mod pipeline;
pub mod providers;

// Re-export commonly used items
pub use config::AppConfig;
pub use document::Document;
pub use error::{RagError, RagResult};
pub use pipeline::{Answer, LazyPipeline, RagPipeline};
