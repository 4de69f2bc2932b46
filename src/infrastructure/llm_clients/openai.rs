use super::{endpoint, http_client, LLMClient};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Any server speaking the OpenAI `/chat/completions` protocol
/// (LM Studio, vLLM, OpenRouter, Ollama's compatibility layer).
pub struct OpenAIClient {
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
        }
    }

    fn build_body(config: &LLMConfig, prompt: &str) -> serde_json::Value {
        json!({
            "model": config.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": config.temperature,
        })
    }

    fn extract_content(json: &serde_json::Value) -> Result<String> {
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::ModelCallError("Invalid response format".to_string()))
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(&self, config: &LLMConfig, prompt: &str) -> Result<String> {
        let url = endpoint(&config.base_url, "chat/completions");

        let mut request = self.client.post(&url);
        if let Some(api_key) = &config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .json(&Self::build_body(config, prompt))
            .send()
            .await
            .map_err(|e| AppError::ModelCallError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::ModelCallError(format!(
                "API error ({}): {}",
                status, text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::ModelCallError(format!("Failed to parse JSON: {}", e)))?;

        Self::extract_content(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_carries_single_user_message() {
        let config = LLMConfig::default().for_model("gpt-4o-mini", 0.0);
        let body = OpenAIClient::build_body(&config, "How many orders?");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "How many orders?");
        assert_eq!(body["temperature"], 0.0);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_extract_content() {
        let json = json!({"choices": [{"message": {"role": "assistant", "content": "There are 42."}}]});
        assert_eq!(OpenAIClient::extract_content(&json).unwrap(), "There are 42.");

        let missing = json!({"choices": []});
        assert!(matches!(
            OpenAIClient::extract_content(&missing),
            Err(AppError::ModelCallError(_))
        ));
    }
}
