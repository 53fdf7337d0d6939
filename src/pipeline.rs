//! The `ask` entry point and its lazily-built holder.

use futures::future::{BoxFuture, FutureExt};
use log::info;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::{AppConfig, EmbeddingBackend, GenerationBackend};
use crate::error::{resolve_top_k, RagResult};
use crate::food::recipes::{CorpusLoader, RecipeSource};
use crate::llm::embeddings::EmbeddingEncoder;
use crate::llm::generator::AnswerGenerator;
use crate::llm::retriever::Retriever;
use crate::providers::traits::{CompletionProvider, EmbeddingProvider, GenerationParams};
use crate::providers::{HashingEmbedder, OfflineProvider, OpenAIProvider, TgiProvider};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
}

pub struct RagPipeline {
    retriever: Retriever,
    generator: AnswerGenerator,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, generator: AnswerGenerator) -> Self {
        Self { retriever, generator }
    }

    /// Loads the corpus, builds the index and wires up the configured backends.
    pub async fn from_config(config: &AppConfig) -> RagResult<Self> {
        info!(
            "Initializing recipe pipeline with {} and {}",
            config.embedding.model, config.generation.model
        );

        let documents = CorpusLoader::load(RecipeSource::File(config.recipes_path.clone())).await?;
        let encoder = EmbeddingEncoder::new(embedding_provider(config));
        let retriever = Retriever::build(encoder, documents, config.top_k)
            .await?
            .with_query_cache(config.query_cache_size);

        let params = GenerationParams {
            max_new_tokens: config.generation.max_new_tokens,
            temperature: config.generation.temperature,
        };
        let generator = AnswerGenerator::new(completion_provider(config), params)
            .with_timeout(config.generation.timeout)
            .with_max_concurrent(config.generation.max_concurrent);

        Ok(Self::new(retriever, generator))
    }

    pub async fn ask(&self, question: &str, k: Option<i64>) -> RagResult<Answer> {
        let retrieved = self.retriever.retrieve(question, k).await?;
        let sources = retrieved.texts();
        let text = self.generator.generate(question, &sources).await?;
        Ok(Answer { text, sources })
    }
}

fn embedding_provider(config: &AppConfig) -> Arc<dyn EmbeddingProvider> {
    let embedding = &config.embedding;
    match embedding.backend {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(embedding.dimensions)),
        EmbeddingBackend::OpenAI => Arc::new(
            OpenAIProvider::new(embedding.api_key.as_deref().unwrap_or_default(), &embedding.api_url)
                .with_embedding_model(&embedding.model, embedding.dimensions, embedding.batch_size),
        ),
    }
}

fn completion_provider(config: &AppConfig) -> Box<dyn CompletionProvider + Send + Sync> {
    let generation = &config.generation;
    match generation.backend {
        GenerationBackend::Offline => Box::new(OfflineProvider::new()),
        GenerationBackend::OpenAI => Box::new(
            OpenAIProvider::new(generation.api_key.as_deref().unwrap_or_default(), &generation.api_url)
                .with_completion_model(&generation.model),
        ),
        GenerationBackend::Tgi => Box::new(TgiProvider::new(
            &generation.api_url,
            generation.api_key.clone(),
            &generation.model,
        )),
    }
}

type PipelineInit = Arc<dyn Fn() -> BoxFuture<'static, RagResult<RagPipeline>> + Send + Sync>;

/// Owns a pipeline that is built on first use, at most once.
///
/// Concurrent first callers wait on the same build; a failed build leaves the
/// holder empty so the next call tries again.
pub struct LazyPipeline {
    cell: OnceCell<RagPipeline>,
    init: PipelineInit,
    default_top_k: usize,
}

impl LazyPipeline {
    pub fn new<F, Fut>(default_top_k: usize, init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RagResult<RagPipeline>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            init: Arc::new(move || init().boxed()),
            default_top_k,
        }
    }

    pub fn from_config(config: AppConfig) -> Self {
        let top_k = config.top_k;
        let config = Arc::new(config);
        Self::new(top_k, move || {
            let config = config.clone();
            async move { RagPipeline::from_config(&config).await }
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> RagResult<&RagPipeline> {
        self.cell
            .get_or_try_init(|| {
                info!("Initializing RAG system");
                (self.init)()
            })
            .await
    }

    pub async fn ask(&self, question: &str, k: Option<i64>) -> RagResult<Answer> {
        // Reject bad arguments before paying for a build.
        resolve_top_k(k, self.default_top_k)?;
        self.get().await?.ask(question, k).await
    }
}

/// Default sample corpus bundled with the crate.
pub fn bundled_recipes_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join("recipes.json")
}
