pub mod ollama;
pub mod openai;

use crate::domain::error::Result;
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use crate::domain::pipeline::ModelResponse;
use async_trait::async_trait;
use ollama::OllamaClient;
use openai::OpenAIClient;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[async_trait]
pub trait LLMClient {
    async fn generate(&self, config: &LLMConfig, prompt: &str) -> Result<String>;
}

pub struct RouterClient {
    ollama: OllamaClient,
    openai: OpenAIClient,
}

impl RouterClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            ollama: OllamaClient::new(timeout),
            openai: OpenAIClient::new(timeout),
        }
    }
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn generate(&self, config: &LLMConfig, prompt: &str) -> Result<String> {
        match config.provider {
            LLMProvider::Ollama => self.ollama.generate(config, prompt).await,
            LLMProvider::OpenAI => self.openai.generate(config, prompt).await,
        }
    }
}

/// One backend bound to one model. The coder and the writer are two of these.
#[derive(Clone)]
pub struct ModelClient {
    client: Arc<dyn LLMClient + Send + Sync>,
    config: LLMConfig,
}

impl ModelClient {
    pub fn new(client: Arc<dyn LLMClient + Send + Sync>, config: LLMConfig) -> Self {
        Self { client, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub async fn invoke(&self, prompt: &str) -> Result<ModelResponse> {
        let started = Instant::now();
        let output = self.client.generate(&self.config, prompt).await?;
        Ok(ModelResponse {
            model: self.config.model.clone(),
            output,
            elapsed: started.elapsed(),
        })
    }
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{}{}", base_url, path)
    } else {
        format!("{}/{}", base_url, path)
    }
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AppError;

    struct EchoClient;

    #[async_trait]
    impl LLMClient for EchoClient {
        async fn generate(&self, config: &LLMConfig, prompt: &str) -> Result<String> {
            Ok(format!("{}:{}", config.model, prompt))
        }
    }

    struct DownClient;

    #[async_trait]
    impl LLMClient for DownClient {
        async fn generate(&self, _config: &LLMConfig, _prompt: &str) -> Result<String> {
            Err(AppError::ModelCallError("connection refused".to_string()))
        }
    }

    #[test]
    fn test_endpoint_joins_slash() {
        assert_eq!(
            endpoint("http://localhost:11434", "api/generate"),
            "http://localhost:11434/api/generate"
        );
        assert_eq!(
            endpoint("http://localhost:1234/v1/", "chat/completions"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_invoke_reports_model_and_output() {
        let config = LLMConfig::default().for_model("smollm2:latest", 0.3);
        let client = ModelClient::new(Arc::new(EchoClient), config);
        let response = client.invoke("hello").await.unwrap();
        assert_eq!(response.model, "smollm2:latest");
        assert_eq!(response.output, "smollm2:latest:hello");
    }

    #[tokio::test]
    async fn test_invoke_propagates_backend_error() {
        let client = ModelClient::new(Arc::new(DownClient), LLMConfig::default());
        let err = client.invoke("hello").await.unwrap_err();
        assert!(matches!(err, AppError::ModelCallError(_)));
    }
}
