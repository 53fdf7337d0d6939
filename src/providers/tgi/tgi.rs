use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::providers::traits::{CompletionProvider, GenerationParams};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Client for a Hugging Face text-generation-inference server.
#[derive(Clone)]
pub struct TgiProvider {
    api_url: String,
    api_key: Option<String>,
    client: Client,
    model: String,
}

impl TgiProvider {
    pub fn new(api_url: &str, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
            model: model.into(),
        }
    }

    fn request_body(prompt: &str, params: &GenerationParams) -> Value {
        json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": params.max_new_tokens,
                "temperature": params.temperature,
                "do_sample": true,
                "return_full_text": true
            }
        })
    }
}

fn extract_generated_text(response_json: &Value) -> Option<String> {
    // TGI answers with an object, the hosted inference API with a one-element array.
    let body = match response_json {
        Value::Array(items) => items.first()?,
        other => other,
    };
    body.get("generated_text")
        .and_then(|text| text.as_str())
        .map(|s| s.to_string())
}

#[async_trait]
impl CompletionProvider for TgiProvider {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let mut request = self
            .client
            .post(format!("{}/generate", self.api_url))
            .header("Content-Type", "application/json")
            .json(&Self::request_body(prompt, params));

        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("API request failed: Status {}, Body: {}", status, error_text));
        }

        let response_json: Value = response.json().await?;

        if let Some(error) = response_json.get("error") {
            return Err(anyhow!("API returned error: {}", error));
        }

        extract_generated_text(&response_json).ok_or_else(|| {
            let debug_json = serde_json::to_string_pretty(&response_json).unwrap_or_default();
            anyhow!("Invalid response format. Response JSON: {}", debug_json)
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_asks_for_full_text() {
        let params = GenerationParams { max_new_tokens: 128, temperature: 0.5 };
        let body = TgiProvider::request_body("hello", &params);
        assert_eq!(body["inputs"], "hello");
        assert_eq!(body["parameters"]["max_new_tokens"], 128);
        assert_eq!(body["parameters"]["return_full_text"], true);
        assert_eq!(body["parameters"]["do_sample"], true);
    }

    #[test]
    fn test_model_name_and_trimmed_url() {
        let provider = TgiProvider::new("http://localhost:8080/", None, "TinyLlama/TinyLlama-1.1B-Chat-v1.0");
        assert_eq!(provider.model_name(), "TinyLlama/TinyLlama-1.1B-Chat-v1.0");
        assert_eq!(provider.api_url, "http://localhost:8080");
    }

    #[test]
    fn test_extract_generated_text_shapes() {
        let object = json!({"generated_text": "prompt [/INST] answer"});
        let array = json!([{"generated_text": "prompt [/INST] answer"}]);
        assert_eq!(extract_generated_text(&object).as_deref(), Some("prompt [/INST] answer"));
        assert_eq!(extract_generated_text(&array).as_deref(), Some("prompt [/INST] answer"));
        assert_eq!(extract_generated_text(&json!({"text": "x"})), None);
    }
}
