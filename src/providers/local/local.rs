//! Backends that run in-process with no model weights or network access.

use anyhow::Result;
use async_trait::async_trait;

use crate::providers::traits::{CompletionProvider, EmbeddingProvider, GenerationParams};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Deterministic bag-of-words encoder using signed feature hashing.
///
/// Vectors are L2-normalized; text without any word characters maps to the
/// zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    batch_size: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            batch_size: 256,
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RecipeSummary {
    name: String,
    ingredients: String,
    steps: String,
}

fn field_after<'a>(chunk: &'a str, label: &str) -> Option<&'a str> {
    let start = chunk.find(label)? + label.len();
    let rest = &chunk[start..];
    Some(rest.split('\n').next().unwrap_or(rest).trim())
}

fn parse_recipes(prompt: &str) -> Vec<RecipeSummary> {
    let context = match (prompt.find("<<SYS>>"), prompt.find("<</SYS>>")) {
        (Some(open), Some(close)) if open < close => &prompt[open..close],
        _ => prompt,
    };

    context
        .split("Recipe: ")
        .skip(1)
        .filter_map(|chunk| {
            Some(RecipeSummary {
                name: chunk.split('\n').next()?.trim().to_string(),
                ingredients: field_after(chunk, "Ingredients: ")?.to_string(),
                steps: field_after(chunk, "Steps: ")?.to_string(),
            })
        })
        .collect()
}

/// Extractive responder that echoes the prompt and answers from the recipes
/// embedded in it, mimicking a local text-generation pipeline.
#[derive(Debug, Clone, Default)]
pub struct OfflineProvider;

impl OfflineProvider {
    pub fn new() -> Self {
        Self
    }

    fn reply(prompt: &str, params: &GenerationParams) -> String {
        let recipes = parse_recipes(prompt);
        let Some(best) = recipes.first() else {
            return "I couldn't find a recipe that matches your question.".to_string();
        };

        let mut reply = format!(
            "I'd suggest {}. You will need: {}. Steps: {}",
            best.name, best.ingredients, best.steps
        );
        if recipes.len() > 1 {
            let others: Vec<&str> = recipes[1..].iter().map(|r| r.name.as_str()).collect();
            reply.push_str(&format!("\nYou might also like: {}.", others.join(", ")));
        }

        let limit = params.max_new_tokens as usize;
        let words: Vec<&str> = reply.split_whitespace().collect();
        if words.len() > limit {
            words[..limit].join(" ")
        } else {
            reply
        }
    }
}

#[async_trait]
impl CompletionProvider for OfflineProvider {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        Ok(format!("{}\n{}", prompt, Self::reply(prompt, params)))
    }

    fn model_name(&self) -> &str {
        "offline-extractive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Fluffy pancakes with maple syrup");
        let b = embedder.embed("Fluffy pancakes with maple syrup");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_empty_text_is_zero() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.embed("  ... ").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["soup".to_string(), "salad".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors[0], embedder.embed("soup"));
        assert_eq!(vectors[1], embedder.embed("salad"));
    }

    #[test]
    fn test_parse_recipes_from_concatenated_context() {
        let prompt = "[INST] <<SYS>>\nAnswer based on the following recipes:\n\n\
            Recipe: Pancakes\nIngredients: flour, egg, milk\nSteps: mix; cook\
            Recipe: Waffles\nIngredients: flour, butter\nSteps: heat iron; bake\n<</SYS>>\n\n\
            Question: Recipe: ignored [/INST]";
        let recipes = parse_recipes(prompt);
        assert_eq!(recipes.len(), 2);
        assert_eq!(recipes[0].name, "Pancakes");
        assert_eq!(recipes[0].steps, "mix; cook");
        assert_eq!(recipes[1].ingredients, "flour, butter");
    }

    #[tokio::test]
    async fn test_offline_provider_echoes_prompt() {
        let prompt = "<<SYS>>\nRecipe: Toast\nIngredients: bread\nSteps: toast it\n<</SYS>>\nQuestion: breakfast? [/INST]";
        let output = OfflineProvider::new()
            .complete(prompt, &GenerationParams::default())
            .await
            .unwrap();
        assert!(output.starts_with(prompt));
        assert!(output.ends_with("I'd suggest Toast. You will need: bread. Steps: toast it"));
    }
}
