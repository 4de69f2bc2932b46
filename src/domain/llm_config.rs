use crate::domain::error::AppError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LLMProvider {
    Ollama,
    #[serde(rename = "OpenAI")]
    OpenAI,
}

impl FromStr for LLMProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" | "local" => Ok(LLMProvider::Ollama),
            "openai" | "openai-compatible" => Ok(LLMProvider::OpenAI),
            other => Err(AppError::ConfigurationError(format!(
                "LLM_PROVIDER must be 'ollama' or 'openai', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "smollm2:latest".to_string(),
            api_key: None,
            temperature: Some(0.3),
        }
    }
}

impl LLMConfig {
    /// Same backend, different model and sampling temperature.
    pub fn for_model(&self, model: &str, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            temperature: Some(temperature),
            ..self.clone()
        }
    }
}
