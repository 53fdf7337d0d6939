use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::error::{RagError, RagResult};
use crate::providers::traits::{CompletionProvider, GenerationParams};

pub const INSTRUCTION_START: &str = "[INST]";
pub const SYSTEM_START: &str = "<<SYS>>";
pub const SYSTEM_END: &str = "<</SYS>>";
pub const INSTRUCTION_END: &str = "[/INST]";

const SYSTEM_INSTRUCTION: &str =
    "You are a professional recipe assistant. Answer the user's question based on the following recipes:";

/// Inputs for a single answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub question: String,
    pub context: Vec<String>,
}

impl GenerationRequest {
    pub fn new(question: impl Into<String>, context: Vec<String>) -> Self {
        Self {
            question: question.into(),
            context,
        }
    }

    /// Context documents are joined with no separator.
    pub fn prompt(&self) -> String {
        format!(
            "{} {}\n{}\n\n{}\n{}\n\nQuestion: {} {}",
            INSTRUCTION_START,
            SYSTEM_START,
            SYSTEM_INSTRUCTION,
            self.context.concat(),
            SYSTEM_END,
            self.question,
            INSTRUCTION_END
        )
    }
}

/// Returns the text after the last closing marker, trimmed.
pub fn extract_answer(raw: &str) -> RagResult<String> {
    let (_, answer) = raw.rsplit_once(INSTRUCTION_END).ok_or_else(|| {
        RagError::GenerationFormat(format!(
            "Backend output does not contain the '{}' marker",
            INSTRUCTION_END
        ))
    })?;

    let answer = answer.trim();
    if answer.is_empty() {
        return Err(RagError::GenerationFormat(
            "Backend produced nothing after the prompt".to_string(),
        ));
    }
    Ok(answer.to_string())
}

/// Prompts a completion backend with retrieved recipes and extracts the reply.
///
/// Backend calls pass through an admission gate so at most
/// `max_concurrent` generations run at once; the rest wait their turn.
pub struct AnswerGenerator {
    provider: Box<dyn CompletionProvider + Send + Sync>,
    params: GenerationParams,
    gate: Arc<Semaphore>,
    timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(provider: Box<dyn CompletionProvider + Send + Sync>, params: GenerationParams) -> Self {
        Self {
            provider,
            params,
            gate: Arc::new(Semaphore::new(1)),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.gate = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    pub async fn generate(&self, question: &str, context: &[String]) -> RagResult<String> {
        self.generate_request(&GenerationRequest::new(question, context.to_vec()))
            .await
    }

    pub async fn generate_request(&self, request: &GenerationRequest) -> RagResult<String> {
        info!(
            "Generating answer with {} for: '{}'",
            self.provider.model_name(),
            request.question
        );
        let prompt = request.prompt();

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| RagError::Generation(format!("Generation gate closed: {}", e)))?;

        let raw = match timeout(self.timeout, self.provider.complete(&prompt, &self.params)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                error!("Generation error: {}", e);
                return Err(RagError::Generation(e.to_string()));
            }
            Err(_) => {
                warn!("Generation timed out after {:?}", self.timeout);
                return Err(RagError::GenerationTimeout(self.timeout));
            }
        };

        extract_answer(&raw)
    }
}
