//! Prompt templates for both model calls.
//!
//! Each template exists in two size classes. `short` carries the full schema with
//! sample rows and the complete rule list; `tiny` keeps only what a small model
//! needs. Rendering is a single pass over `{slot}` placeholders, so a question
//! that itself contains `{result}` is never expanded a second time.

use crate::application::use_cases::result_sanitizer::NO_ROWS_MARKER;
use crate::domain::error::{AppError, Result};
use crate::domain::pipeline::{Question, SizeClass, SqlStatement};
use crate::domain::schema::{SchemaContext, TableSchema};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fmt::Write;

static SLOT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

const SQL_PROMPT_SHORT: &str = r#"Based on the table schema below, write a {dialect} query that answers the user's question.

RULES:
1. Output ONLY the SQL query.
2. Do not wrap in markdown or code blocks.
3. Do not include explanations.
4. Use standard {dialect} syntax.
5. Write a single read-only statement.

Table Schema:
{schema}

Question: {question}

SQL Query:
"#;

const SQL_PROMPT_TINY: &str = r#"Task: write one {dialect} SELECT query. Output only SQL.
Tables:
{schema}
Question: {question}
SQL:
"#;

const ANSWER_PROMPT_SHORT: &str = r#"You are a financial data assistant.
User Question: "{question}"

Context:
- SQL Query Run: {query}
- Data Returned: {result}

Instructions:
1. Answer the user's question using the Data Returned.
2. FORMATTING RULE: Format all currency values in USD (e.g., $1,000). Do NOT show decimal points (round to nearest dollar).
3. If the Data Returned is "{no_rows}", state that no records were found.
4. Be concise and professional.
"#;

const ANSWER_PROMPT_TINY: &str = r#"Task: Answer based on Data.
Question: {question}
Data: {result}

Rules:
1. If Data is "{no_rows}", say "No data found."
2. FORMATTING: Show money in USD (e.g. $500). NO decimals.
3. Do not explain the SQL.
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateId {
    Sql(SizeClass),
    Answer(SizeClass),
}

impl TemplateId {
    fn text(&self) -> &'static str {
        match self {
            TemplateId::Sql(SizeClass::Short) => SQL_PROMPT_SHORT,
            TemplateId::Sql(SizeClass::Tiny) => SQL_PROMPT_TINY,
            TemplateId::Answer(SizeClass::Short) => ANSWER_PROMPT_SHORT,
            TemplateId::Answer(SizeClass::Tiny) => ANSWER_PROMPT_TINY,
        }
    }
}

/// A template plus the values for its slots. Rendered once.
#[derive(Debug, Clone)]
pub struct PromptSpec {
    template: TemplateId,
    slots: BTreeMap<&'static str, String>,
}

impl PromptSpec {
    pub fn new(template: TemplateId) -> Self {
        Self {
            template,
            slots: BTreeMap::new(),
        }
    }

    pub fn slot(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.slots.insert(name, value.into());
        self
    }

    pub fn render(&self) -> Result<String> {
        let text = self.template.text();

        if let Some(missing) = SLOT_PATTERN
            .captures_iter(text)
            .map(|caps| caps[1].to_string())
            .find(|name| !self.slots.contains_key(name.as_str()))
        {
            return Err(AppError::Internal(format!(
                "Prompt template {:?} has no value for slot '{}'",
                self.template, missing
            )));
        }

        let rendered = SLOT_PATTERN.replace_all(text, |caps: &Captures| {
            self.slots
                .get(&caps[1])
                .cloned()
                .unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}

pub struct PromptBuilder {
    size_class: SizeClass,
}

impl PromptBuilder {
    pub fn new(size_class: SizeClass) -> Self {
        Self { size_class }
    }

    pub fn size_class(&self) -> SizeClass {
        self.size_class
    }

    pub fn sql_prompt(&self, question: &Question, schema: &SchemaContext) -> PromptSpec {
        PromptSpec::new(TemplateId::Sql(self.size_class))
            .slot("dialect", schema.driver.dialect())
            .slot("schema", render_schema(schema, self.size_class))
            .slot("question", question.as_str())
    }

    pub fn answer_prompt(
        &self,
        question: &Question,
        sql: &SqlStatement,
        result_text: &str,
    ) -> PromptSpec {
        PromptSpec::new(TemplateId::Answer(self.size_class))
            .slot("question", question.as_str())
            .slot("query", sql.as_str())
            .slot("result", result_text)
            .slot("no_rows", NO_ROWS_MARKER)
    }
}

pub fn render_schema(schema: &SchemaContext, size_class: SizeClass) -> String {
    if schema.tables.is_empty() {
        return "(no tables found)".to_string();
    }

    let blocks: Vec<String> = schema
        .tables
        .iter()
        .map(|table| match size_class {
            SizeClass::Short => render_table_full(table),
            SizeClass::Tiny => render_table_compact(table),
        })
        .collect();

    match size_class {
        SizeClass::Short => blocks.join("\n\n"),
        SizeClass::Tiny => blocks.join("\n"),
    }
}

fn render_table_full(table: &TableSchema) -> String {
    let mut out = format!("CREATE TABLE {} (\n", table.table_name);
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("\t{} {}", c.column_name, c.data_type))
        .collect();
    out.push_str(&columns.join(",\n"));
    out.push_str("\n)");

    if !table.sample_rows.is_empty() {
        let header: Vec<&str> = table.columns.iter().map(|c| c.column_name.as_str()).collect();
        let _ = write!(
            out,
            "\n\n/*\n{} rows from {} table:\n{}",
            table.sample_rows.len(),
            table.table_name,
            header.join("\t")
        );
        for row in &table.sample_rows {
            let _ = write!(out, "\n{}", row.join("\t"));
        }
        out.push_str("\n*/");
    }

    out
}

fn render_table_compact(table: &TableSchema) -> String {
    let columns: Vec<&str> = table.columns.iter().map(|c| c.column_name.as_str()).collect();
    format!("{}({})", table.table_name, columns.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{ColumnInfo, DbDriver};

    fn schema() -> SchemaContext {
        SchemaContext::new(
            DbDriver::MySql,
            vec![TableSchema {
                table_name: "customers".to_string(),
                columns: vec![
                    ColumnInfo {
                        column_name: "id".to_string(),
                        data_type: "int".to_string(),
                    },
                    ColumnInfo {
                        column_name: "company_name".to_string(),
                        data_type: "varchar(40)".to_string(),
                    },
                ],
                sample_rows: vec![vec!["1".to_string(), "Alfreds Futterkiste".to_string()]],
            }],
        )
    }

    #[test]
    fn test_every_size_class_contains_question() {
        let question = Question::new("How many customers are there?").unwrap();
        for size_class in [SizeClass::Short, SizeClass::Tiny] {
            let prompt = PromptBuilder::new(size_class)
                .sql_prompt(&question, &schema())
                .render()
                .unwrap();
            assert!(!prompt.is_empty());
            assert!(prompt.contains("How many customers are there?"));
            assert!(prompt.contains("MySQL"));
        }
    }

    #[test]
    fn test_short_schema_has_samples_and_tiny_does_not() {
        let question = Question::new("List customers").unwrap();
        let short = PromptBuilder::new(SizeClass::Short)
            .sql_prompt(&question, &schema())
            .render()
            .unwrap();
        assert!(short.contains("CREATE TABLE customers ("));
        assert!(short.contains("Alfreds Futterkiste"));
        assert!(short.contains("RULES:"));

        let tiny = PromptBuilder::new(SizeClass::Tiny)
            .sql_prompt(&question, &schema())
            .render()
            .unwrap();
        assert!(tiny.contains("customers(id, company_name)"));
        assert!(!tiny.contains("Alfreds Futterkiste"));
        assert!(tiny.len() < short.len());
    }

    #[test]
    fn test_answer_prompt_embeds_result() {
        let question = Question::new("How many customers are there?").unwrap();
        let sql = SqlStatement::new("SELECT COUNT(*) FROM customers".to_string()).unwrap();
        for size_class in [SizeClass::Short, SizeClass::Tiny] {
            let prompt = PromptBuilder::new(size_class)
                .answer_prompt(&question, &sql, "42")
                .render()
                .unwrap();
            assert!(prompt.contains("How many customers are there?"));
            assert!(prompt.contains("42"));
            assert!(prompt.contains(NO_ROWS_MARKER));
        }
    }

    #[test]
    fn test_slot_values_are_not_reexpanded() {
        let question = Question::new("What does {result} mean?").unwrap();
        let sql = SqlStatement::new("SELECT 1".to_string()).unwrap();
        let prompt = PromptBuilder::new(SizeClass::Tiny)
            .answer_prompt(&question, &sql, "1")
            .render()
            .unwrap();
        assert!(prompt.contains("What does {result} mean?"));
    }

    #[test]
    fn test_missing_slot_is_error() {
        let spec = PromptSpec::new(TemplateId::Sql(SizeClass::Tiny)).slot("question", "q");
        assert!(matches!(spec.render(), Err(AppError::Internal(_))));
    }

    #[test]
    fn test_empty_schema_placeholder() {
        let empty = SchemaContext::new(DbDriver::Postgres, Vec::new());
        assert_eq!(render_schema(&empty, SizeClass::Short), "(no tables found)");
    }
}
