use super::{endpoint, http_client, LLMClient};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Native Ollama `/api/generate`, non-streaming.
pub struct OllamaClient {
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
        }
    }

    fn build_request<'a>(config: &'a LLMConfig, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &config.model,
            prompt,
            stream: false,
            options: config
                .temperature
                .map(|temperature| GenerateOptions { temperature }),
        }
    }

    fn parse_response(body: &str) -> Result<String> {
        serde_json::from_str::<GenerateResponse>(body)
            .map(|parsed| parsed.response)
            .map_err(|e| AppError::ModelCallError(format!("Failed to parse Ollama response: {}", e)))
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn generate(&self, config: &LLMConfig, prompt: &str) -> Result<String> {
        let url = endpoint(&config.base_url, "api/generate");
        let body = Self::build_request(config, prompt);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ModelCallError(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::ModelCallError(format!(
                "Ollama error ({}) for model '{}': {}",
                status, config.model, text
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AppError::ModelCallError(format!("Failed to read response: {}", e)))?;

        Self::parse_response(&text)
    }
}
