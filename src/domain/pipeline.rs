use crate::domain::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// A user question, fixed for the lifetime of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

impl Question {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Question must not be empty".to_string(),
            ));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prompt template variant, trading context length for model size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    /// Full schema with sample rows and the complete rule list.
    Short,
    /// Minimal instructions for small context windows.
    Tiny,
}

impl SizeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Short => "short",
            SizeClass::Tiny => "tiny",
        }
    }
}

impl FromStr for SizeClass {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(SizeClass::Short),
            "tiny" => Ok(SizeClass::Tiny),
            other => Err(AppError::ConfigurationError(format!(
                "Unknown prompt size class '{}' (expected 'short' or 'tiny')",
                other
            ))),
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw text returned by one model call.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub model: String,
    pub output: String,
    pub elapsed: Duration,
}

/// SQL that survived sanitization. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement(String);

impl SqlStatement {
    pub(crate) fn new(sql: String) -> Result<Self> {
        if sql.trim().is_empty() {
            return Err(AppError::SanitizationError(
                "Sanitized SQL is empty".to_string(),
            ));
        }
        Ok(Self(sql))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rows returned by the database, in result order.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, serde_json::Value>>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<HashMap<String, serde_json::Value>>) -> Self {
        Self {
            columns,
            row_count: rows.len(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell of `row` under `column`, `Null` when absent.
    pub fn cell(&self, row: usize, column: &str) -> &serde_json::Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&serde_json::Value::Null)
    }
}

/// Plain-text form of a cell value.
pub fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Bounds applied when rendering a result set into the answer prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ResultLimits {
    #[validate(range(min = 1, max = 10000))]
    pub max_rows: usize,
    #[validate(range(min = 1, max = 200))]
    pub max_columns: usize,
    #[validate(range(min = 8, max = 10000))]
    pub max_cell_chars: usize,
    #[validate(range(min = 64, max = 200000))]
    pub max_chars: usize,
}

impl Default for ResultLimits {
    fn default() -> Self {
        Self {
            max_rows: 50,
            max_columns: 20,
            max_cell_chars: 200,
            max_chars: 4000,
        }
    }
}

/// What a successful run hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub question: String,
    pub sql_query: String,
    pub answer: String,
    pub timings: StepTimings,
}

/// Per-step wall-clock times in seconds, rounded to two decimals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StepTimings {
    pub sql_generation: f64,
    pub query_execution: f64,
    pub answer_generation: f64,
    pub total: f64,
}

pub fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_question_rejected() {
        assert!(Question::new("   ").is_err());
        assert_eq!(
            Question::new("How many customers?").unwrap().as_str(),
            "How many customers?"
        );
    }

    #[test]
    fn test_size_class_parsing() {
        assert_eq!("short".parse::<SizeClass>().unwrap(), SizeClass::Short);
        assert_eq!(" TINY ".parse::<SizeClass>().unwrap(), SizeClass::Tiny);
        assert!(matches!(
            "medium".parse::<SizeClass>(),
            Err(AppError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_empty_statement_rejected() {
        assert!(matches!(
            SqlStatement::new("  ".to_string()),
            Err(AppError::SanitizationError(_))
        ));
    }

    #[test]
    fn test_round_secs() {
        assert_eq!(round_secs(Duration::from_millis(1234)), 1.23);
        assert_eq!(round_secs(Duration::ZERO), 0.0);
    }
}
