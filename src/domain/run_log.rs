use crate::domain::pipeline::StepTimings;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    GenerateSql,
    SanitizeSql,
    ExecuteQuery,
    SanitizeResult,
    GenerateAnswer,
    Run,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::GenerateSql => "generate_sql",
            PipelineStep::SanitizeSql => "sanitize_sql",
            PipelineStep::ExecuteQuery => "execute_query",
            PipelineStep::SanitizeResult => "sanitize_result",
            PipelineStep::GenerateAnswer => "generate_answer",
            PipelineStep::Run => "run",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closing record of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub question: String,
    pub sql_model: String,
    pub nlp_model: String,
    pub sql_query: Option<String>,
    pub success: bool,
    pub timings: StepTimings,
}

/// One append-only record per pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub run_id: Uuid,
    pub timestamp: DateTime<Local>,
    pub step: PipelineStep,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl RunLogEntry {
    pub fn new(run_id: Uuid, step: PipelineStep, elapsed: Duration) -> Self {
        Self {
            run_id,
            timestamp: Local::now(),
            step,
            model: None,
            prompt: None,
            output: None,
            error: None,
            elapsed_ms: elapsed.as_millis() as u64,
            summary: None,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = Some(output.to_string());
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_summary(mut self, summary: RunSummary) -> Self {
        self.summary = Some(summary);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_step_in_snake_case() {
        let entry = RunLogEntry::new(Uuid::new_v4(), PipelineStep::GenerateSql, Duration::from_millis(1500))
            .with_model("qwen3-coder:30b")
            .with_output("SELECT 1");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["step"], "generate_sql");
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["model"], "qwen3-coder:30b");
        assert!(json.get("error").is_none());
        assert!(json.get("summary").is_none());
    }
}
