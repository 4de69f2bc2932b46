use crate::application::use_cases::prompt_builder::PromptBuilder;
use crate::application::use_cases::result_sanitizer::sanitize_result;
use crate::application::use_cases::sql_sanitizer::sanitize_sql;
use crate::domain::error::Result;
use crate::domain::pipeline::{round_secs, PipelineOutcome, Question, ResultLimits, StepTimings};
use crate::domain::run_log::{PipelineStep, RunLogEntry, RunSummary};
use crate::domain::schema::SchemaContext;
use crate::infrastructure::db::QueryExecutor;
use crate::infrastructure::llm_clients::ModelClient;
use crate::infrastructure::run_logger::RunObserver;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Question in, answer out: coder model, SQL sanitizer, database, result
/// sanitizer, writer model. Steps run strictly one after another.
pub struct TextToSqlUseCase {
    coder: ModelClient,
    writer: ModelClient,
    executor: Arc<dyn QueryExecutor + Send + Sync>,
    prompts: PromptBuilder,
    schema: SchemaContext,
    limits: ResultLimits,
    observers: Vec<Arc<dyn RunObserver + Send + Sync>>,
}

impl TextToSqlUseCase {
    pub fn new(
        coder: ModelClient,
        writer: ModelClient,
        executor: Arc<dyn QueryExecutor + Send + Sync>,
        prompts: PromptBuilder,
        schema: SchemaContext,
        limits: ResultLimits,
    ) -> Self {
        Self {
            coder,
            writer,
            executor,
            prompts,
            schema,
            limits,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver + Send + Sync>) -> Self {
        self.observers.push(observer);
        self
    }

    pub async fn execute(&self, question: &Question) -> Result<PipelineOutcome> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut timings = StepTimings::default();
        let mut sql_query = None;

        let outcome = self
            .run_steps(run_id, question, &mut timings, &mut sql_query)
            .await;
        timings.total = round_secs(started.elapsed());

        let summary = RunSummary {
            question: question.to_string(),
            sql_model: self.coder.model().to_string(),
            nlp_model: self.writer.model().to_string(),
            sql_query: sql_query.clone(),
            success: outcome.is_ok(),
            timings: timings.clone(),
        };
        let entry = RunLogEntry::new(run_id, PipelineStep::Run, started.elapsed())
            .with_summary(summary);
        self.record(entry, &outcome, |answer| answer.clone());

        match outcome {
            Ok(answer) => {
                tracing::info!("Run {} finished in {:.2}s", run_id, timings.total);
                Ok(PipelineOutcome {
                    question: question.to_string(),
                    sql_query: sql_query.unwrap_or_default(),
                    answer,
                    timings,
                })
            }
            Err(e) => {
                tracing::error!("Run {} failed ({}): {}", run_id, e.kind(), e);
                Err(e)
            }
        }
    }

    async fn run_steps(
        &self,
        run_id: Uuid,
        question: &Question,
        timings: &mut StepTimings,
        sql_query: &mut Option<String>,
    ) -> Result<String> {
        let sql_prompt = self.prompts.sql_prompt(question, &self.schema).render()?;
        tracing::debug!(
            "Generating SQL with {} ({} prompt)",
            self.coder.model(),
            self.prompts.size_class()
        );

        let step = Instant::now();
        let generated = self.coder.invoke(&sql_prompt).await;
        self.record(
            RunLogEntry::new(run_id, PipelineStep::GenerateSql, step.elapsed())
                .with_model(self.coder.model())
                .with_prompt(&sql_prompt),
            &generated,
            |response| response.output.clone(),
        );
        let generated = generated?;
        timings.sql_generation = round_secs(generated.elapsed);
        tracing::info!("SQL generated in {:.2}s", timings.sql_generation);

        let step = Instant::now();
        let sanitized = sanitize_sql(&generated.output);
        self.record(
            RunLogEntry::new(run_id, PipelineStep::SanitizeSql, step.elapsed()),
            &sanitized,
            |sql| sql.to_string(),
        );
        let sql = sanitized?;
        *sql_query = Some(sql.to_string());

        let step = Instant::now();
        let rows = self.executor.execute(sql.as_str()).await;
        let query_elapsed = step.elapsed();
        self.record(
            RunLogEntry::new(run_id, PipelineStep::ExecuteQuery, query_elapsed),
            &rows,
            |result| format!("{} rows", result.row_count),
        );
        let rows = rows?;
        timings.query_execution = round_secs(query_elapsed);
        tracing::info!(
            "Query returned {} rows in {:.2}s",
            rows.row_count,
            timings.query_execution
        );

        let step = Instant::now();
        let result_text = sanitize_result(&rows, &self.limits);
        self.notify(
            &RunLogEntry::new(run_id, PipelineStep::SanitizeResult, step.elapsed())
                .with_output(&result_text),
        );

        let answer_prompt = self
            .prompts
            .answer_prompt(question, &sql, &result_text)
            .render()?;

        let step = Instant::now();
        let answer = self.writer.invoke(&answer_prompt).await;
        self.record(
            RunLogEntry::new(run_id, PipelineStep::GenerateAnswer, step.elapsed())
                .with_model(self.writer.model())
                .with_prompt(&answer_prompt),
            &answer,
            |response| response.output.clone(),
        );
        let answer = answer?;
        timings.answer_generation = round_secs(answer.elapsed);
        tracing::info!("Answer generated in {:.2}s", timings.answer_generation);

        Ok(answer.output)
    }

    fn record<T>(&self, entry: RunLogEntry, outcome: &Result<T>, describe: impl FnOnce(&T) -> String) {
        if self.observers.is_empty() {
            return;
        }
        let entry = match outcome {
            Ok(value) => entry.with_output(&describe(value)),
            Err(e) => entry.with_error(&e.to_string()),
        };
        self.notify(&entry);
    }

    fn notify(&self, entry: &RunLogEntry) {
        for observer in &self.observers {
            if let Err(e) = observer.record(entry) {
                tracing::warn!("Failed to write run log for step {}: {}", entry.step, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::result_sanitizer::NO_ROWS_MARKER;
    use crate::domain::error::AppError;
    use crate::domain::llm_config::LLMConfig;
    use crate::domain::pipeline::{QueryResult, SizeClass};
    use crate::domain::schema::{ColumnInfo, DbDriver, TableSchema};
    use crate::infrastructure::llm_clients::LLMClient;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedLlm {
        async fn generate(&self, _config: &LLMConfig, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::ModelCallError("no scripted reply".to_string())))
        }
    }

    struct ScriptedExecutor {
        reply: Result<QueryResult>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(reply: Result<QueryResult>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryExecutor for ScriptedExecutor {
        async fn execute(&self, sql: &str) -> Result<QueryResult> {
            self.calls.lock().unwrap().push(sql.to_string());
            self.reply.clone()
        }

        async fn describe_schema(&self, _sample_rows: usize) -> Result<SchemaContext> {
            Ok(SchemaContext::new(DbDriver::MySql, Vec::new()))
        }
    }

    #[derive(Default)]
    struct MemoryLog {
        entries: Mutex<Vec<RunLogEntry>>,
    }

    impl MemoryLog {
        fn steps(&self) -> Vec<PipelineStep> {
            self.entries.lock().unwrap().iter().map(|e| e.step).collect()
        }

        fn last(&self) -> RunLogEntry {
            self.entries.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl RunObserver for MemoryLog {
        fn record(&self, entry: &RunLogEntry) -> Result<()> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    struct BrokenLog;

    impl RunObserver for BrokenLog {
        fn record(&self, _entry: &RunLogEntry) -> Result<()> {
            Err(AppError::IoError("disk full".to_string()))
        }
    }

    fn schema() -> SchemaContext {
        SchemaContext::new(
            DbDriver::MySql,
            vec![TableSchema {
                table_name: "customers".to_string(),
                columns: vec![ColumnInfo {
                    column_name: "customer_id".to_string(),
                    data_type: "int".to_string(),
                }],
                sample_rows: Vec::new(),
            }],
        )
    }

    fn count_result(count: i64) -> QueryResult {
        let mut row = HashMap::new();
        row.insert("count".to_string(), json!(count));
        QueryResult::new(vec!["count".to_string()], vec![row])
    }

    fn use_case(
        coder: Arc<ScriptedLlm>,
        writer: Arc<ScriptedLlm>,
        executor: Arc<ScriptedExecutor>,
    ) -> TextToSqlUseCase {
        let backend = LLMConfig::default();
        TextToSqlUseCase::new(
            ModelClient::new(coder, backend.for_model("sql-coder", 0.0)),
            ModelClient::new(writer, backend.for_model("writer", 0.3)),
            executor,
            PromptBuilder::new(SizeClass::Short),
            schema(),
            ResultLimits::default(),
        )
    }

    #[tokio::test]
    async fn test_count_question_end_to_end() {
        let coder = ScriptedLlm::new(vec![Ok(
            "```sql\nSELECT COUNT(*) FROM customers;\n```".to_string()
        )]);
        let writer = ScriptedLlm::new(vec![Ok("There are 42 customers.".to_string())]);
        let executor = ScriptedExecutor::new(Ok(count_result(42)));
        let log = Arc::new(MemoryLog::default());

        let pipeline = use_case(coder.clone(), writer.clone(), executor.clone())
            .with_observer(log.clone());
        let question = Question::new("How many customers are there?").unwrap();
        let outcome = pipeline.execute(&question).await.unwrap();

        assert_eq!(outcome.sql_query, "SELECT COUNT(*) FROM customers");
        assert!(outcome.answer.contains("42"));
        assert_eq!(executor.calls(), vec!["SELECT COUNT(*) FROM customers".to_string()]);

        let coder_prompts = coder.prompts();
        assert_eq!(coder_prompts.len(), 1);
        assert!(coder_prompts[0].contains("How many customers are there?"));
        assert!(coder_prompts[0].contains("CREATE TABLE customers ("));

        let writer_prompts = writer.prompts();
        assert_eq!(writer_prompts.len(), 1);
        assert!(writer_prompts[0].contains("42"));
        assert!(writer_prompts[0].contains("SELECT COUNT(*) FROM customers"));

        assert_eq!(
            log.steps(),
            vec![
                PipelineStep::GenerateSql,
                PipelineStep::SanitizeSql,
                PipelineStep::ExecuteQuery,
                PipelineStep::SanitizeResult,
                PipelineStep::GenerateAnswer,
                PipelineStep::Run,
            ]
        );
        let entries = log.entries.lock().unwrap().clone();
        assert!(entries.iter().all(|e| e.run_id == entries[0].run_id));
        assert_eq!(entries[0].model.as_deref(), Some("sql-coder"));
        assert_eq!(entries[3].output.as_deref(), Some("42"));

        let summary = log.last().summary.unwrap();
        assert!(summary.success);
        assert_eq!(summary.nlp_model, "writer");
        assert_eq!(summary.sql_query.as_deref(), Some("SELECT COUNT(*) FROM customers"));
    }

    #[tokio::test]
    async fn test_prose_from_coder_stops_before_database() {
        let coder = ScriptedLlm::new(vec![Ok("I cannot answer that.".to_string())]);
        let writer = ScriptedLlm::new(Vec::new());
        let executor = ScriptedExecutor::new(Ok(count_result(1)));
        let log = Arc::new(MemoryLog::default());

        let pipeline = use_case(coder, writer.clone(), executor.clone()).with_observer(log.clone());
        let question = Question::new("How many customers are there?").unwrap();
        let err = pipeline.execute(&question).await.unwrap_err();

        assert!(matches!(err, AppError::SanitizationError(_)));
        assert!(executor.calls().is_empty());
        assert!(writer.prompts().is_empty());

        assert_eq!(
            log.steps(),
            vec![PipelineStep::GenerateSql, PipelineStep::SanitizeSql, PipelineStep::Run]
        );
        let last = log.last();
        assert!(last.error.is_some());
        assert!(!last.summary.unwrap().success);
    }

    #[tokio::test]
    async fn test_database_error_skips_answer_generation() {
        let coder = ScriptedLlm::new(vec![Ok("SELECT COUNT(*) FROM customer".to_string())]);
        let writer = ScriptedLlm::new(vec![Ok("unused".to_string())]);
        let executor = ScriptedExecutor::new(Err(AppError::DatabaseError(
            "You have an error in your SQL syntax".to_string(),
        )));

        let pipeline = use_case(coder, writer.clone(), executor.clone());
        let question = Question::new("How many customers are there?").unwrap();
        let err = pipeline.execute(&question).await.unwrap_err();

        match err {
            AppError::DatabaseError(message) => assert!(message.contains("SQL syntax")),
            other => panic!("expected DatabaseError, got {:?}", other),
        }
        assert_eq!(executor.calls().len(), 1);
        assert!(writer.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_is_terminal() {
        let coder = ScriptedLlm::new(vec![Err(AppError::ModelCallError(
            "connection refused".to_string(),
        ))]);
        let writer = ScriptedLlm::new(Vec::new());
        let executor = ScriptedExecutor::new(Ok(count_result(1)));

        let pipeline = use_case(coder, writer, executor.clone());
        let question = Question::new("How many customers are there?").unwrap();
        let err = pipeline.execute(&question).await.unwrap_err();

        assert!(matches!(err, AppError::ModelCallError(_)));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_passes_marker_to_writer() {
        let coder = ScriptedLlm::new(vec![Ok(
            "SELECT company_name FROM customers WHERE country = 'Atlantis'".to_string()
        )]);
        let writer = ScriptedLlm::new(vec![Ok("No data found.".to_string())]);
        let executor = ScriptedExecutor::new(Ok(QueryResult::new(
            vec!["company_name".to_string()],
            Vec::new(),
        )));

        let pipeline = use_case(coder, writer.clone(), executor);
        let question = Question::new("Which customers are in Atlantis?").unwrap();
        let outcome = pipeline.execute(&question).await.unwrap();

        assert_eq!(outcome.answer, "No data found.");
        assert!(writer.prompts()[0].contains(&format!("Data Returned: {}", NO_ROWS_MARKER)));
    }

    #[tokio::test]
    async fn test_broken_run_log_does_not_fail_run() {
        let coder = ScriptedLlm::new(vec![Ok("SELECT COUNT(*) FROM customers".to_string())]);
        let writer = ScriptedLlm::new(vec![Ok("42 customers.".to_string())]);
        let executor = ScriptedExecutor::new(Ok(count_result(42)));
        let log = Arc::new(MemoryLog::default());

        let pipeline = use_case(coder, writer, executor)
            .with_observer(Arc::new(BrokenLog))
            .with_observer(log.clone());
        let question = Question::new("How many customers are there?").unwrap();
        let outcome = pipeline.execute(&question).await.unwrap();

        assert_eq!(outcome.answer, "42 customers.");
        assert_eq!(log.steps().len(), 6);
    }
}
