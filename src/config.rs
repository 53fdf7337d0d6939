use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::providers::{openai, tgi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Hashing,
    OpenAI,
}

impl FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hashing" | "local" => Ok(Self::Hashing),
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Unknown embedding backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationBackend {
    Offline,
    OpenAI,
    Tgi,
}

impl FromStr for GenerationBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "offline" | "local" => Ok(Self::Offline),
            "openai" => Ok(Self::OpenAI),
            "tgi" => Ok(Self::Tgi),
            other => Err(anyhow!("Unknown LLM backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub api_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub backend: GenerationBackend,
    pub model: String,
    pub api_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_new_tokens: u32,
    pub timeout: Duration,
    pub max_concurrent: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub log_level: String,
    pub allowed_origins: Vec<String>,
    pub recipes_path: PathBuf,
    pub top_k: usize,
    pub query_cache_size: usize,
    pub max_inflight_requests: usize,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, applying defaults for
    /// missing keys and rejecting values that do not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let value = |key: &str, default: &str| -> String { get(key).unwrap_or_else(|| default.to_string()) };

        fn number<T: FromStr>(key: &str, raw: String) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            raw.parse::<T>()
                .with_context(|| format!("{} has an invalid value '{}'", key, raw))
        }

        fn positive<T: PartialEq + From<u8>>(key: &str, value: T) -> Result<T> {
            if value == T::from(0) {
                bail!("{} must be greater than zero", key);
            }
            Ok(value)
        }

        let embedding_backend: EmbeddingBackend = value("EMBEDDING_BACKEND", "hashing").parse()?;
        let generation_backend: GenerationBackend = value("LLM_BACKEND", "offline").parse()?;

        let default_llm_url = match generation_backend {
            GenerationBackend::Tgi => tgi::tgi::DEFAULT_API_URL,
            _ => openai::openai::DEFAULT_API_BASE,
        };

        let temperature: f32 = number("TEMPERATURE", value("TEMPERATURE", "0.7"))?;
        if !(0.0..=2.0).contains(&temperature) {
            bail!("TEMPERATURE must be between 0.0 and 2.0, got {}", temperature);
        }

        let allowed_origins = value("ALLOWED_ORIGINS", "*")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            port: number("PORT", value("PORT", "8000"))?,
            log_level: value("LOG_LEVEL", "info"),
            allowed_origins,
            recipes_path: PathBuf::from(value("RECIPES_PATH", "data/recipes.json")),
            top_k: positive("TOP_K", number("TOP_K", value("TOP_K", "3"))?)?,
            query_cache_size: number("QUERY_CACHE_SIZE", value("QUERY_CACHE_SIZE", "256"))?,
            max_inflight_requests: positive(
                "MAX_INFLIGHT_REQUESTS",
                number("MAX_INFLIGHT_REQUESTS", value("MAX_INFLIGHT_REQUESTS", "64"))?,
            )?,
            embedding: EmbeddingConfig {
                backend: embedding_backend,
                model: value("EMBEDDING_MODEL", "sentence-transformers/all-MiniLM-L6-v2"),
                dimensions: positive(
                    "EMBEDDING_DIMENSIONS",
                    number("EMBEDDING_DIMENSIONS", value("EMBEDDING_DIMENSIONS", "384"))?,
                )?,
                batch_size: positive(
                    "EMBEDDING_BATCH_SIZE",
                    number("EMBEDDING_BATCH_SIZE", value("EMBEDDING_BATCH_SIZE", "64"))?,
                )?,
                api_url: value("EMBEDDING_API_URL", openai::openai::DEFAULT_API_BASE),
                api_key: get("EMBEDDING_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            },
            generation: GenerationConfig {
                backend: generation_backend,
                model: value("LLM_MODEL", "TinyLlama/TinyLlama-1.1B-Chat-v1.0"),
                api_url: value("LLM_API_URL", default_llm_url),
                api_key: get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")),
                temperature,
                max_new_tokens: positive(
                    "MAX_NEW_TOKENS",
                    number("MAX_NEW_TOKENS", value("MAX_NEW_TOKENS", "256"))?,
                )?,
                timeout: Duration::from_secs(positive(
                    "GENERATION_TIMEOUT_SECS",
                    number::<u64>("GENERATION_TIMEOUT_SECS", value("GENERATION_TIMEOUT_SECS", "120"))?,
                )?),
                max_concurrent: positive(
                    "MAX_CONCURRENT_GENERATIONS",
                    number("MAX_CONCURRENT_GENERATIONS", value("MAX_CONCURRENT_GENERATIONS", "1"))?,
                )?,
            },
        })
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hashing);
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.generation.backend, GenerationBackend::Offline);
        assert_eq!(config.generation.max_new_tokens, 256);
        assert_eq!(config.generation.max_concurrent, 1);
        assert_eq!(config.generation.timeout, Duration::from_secs(120));
        assert!(config.allows_any_origin());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("ALLOWED_ORIGINS", "http://localhost:5173, https://recipes.example.com"),
            ("LLM_BACKEND", "tgi"),
            ("TEMPERATURE", "0.2"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:5173", "https://recipes.example.com"]
        );
        assert!(!config.allows_any_origin());
        assert_eq!(config.generation.backend, GenerationBackend::Tgi);
        assert_eq!(config.generation.api_url, tgi::tgi::DEFAULT_API_URL);
        assert_eq!(config.generation.api_key.as_deref(), Some("sk-test"));
        assert!((config.generation.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("TOP_K", "0")]).is_err());
        assert!(config_from(&[("LLM_BACKEND", "gpt-9000")]).is_err());
        assert!(config_from(&[("TEMPERATURE", "5")]).is_err());
        assert!(config_from(&[("MAX_NEW_TOKENS", "0")]).is_err());
        assert!(config_from(&[("GENERATION_TIMEOUT_SECS", "0")]).is_err());
        assert!(config_from(&[("MAX_CONCURRENT_GENERATIONS", "0")]).is_err());
    }
}
