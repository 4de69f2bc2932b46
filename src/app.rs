use crate::application::use_cases::prompt_builder::PromptBuilder;
use crate::application::TextToSqlUseCase;
use crate::domain::error::Result;
use crate::domain::pipeline::{PipelineOutcome, Question};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::executor::{DbConnectionConfig, SqlExecutor};
use crate::infrastructure::db::QueryExecutor;
use crate::infrastructure::llm_clients::{LLMClient, ModelClient, RouterClient};
use crate::infrastructure::run_logger::DailyRunLog;
use crate::interfaces::cli::{self, Cli};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Sample rows per table shown to the coder model.
const SCHEMA_SAMPLE_ROWS: usize = 2;

pub async fn run() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    cli::print_banner();

    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            cli::print_failure(&err);
            return ExitCode::FAILURE;
        }
    };

    match answer(&config, cli.question()).await {
        Ok(outcome) => {
            cli::print_outcome(&outcome, &config.log_dir);
            ExitCode::SUCCESS
        }
        Err(err) => {
            cli::print_failure(&err);
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> Result<AppConfig> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!("Ignoring unreadable .env file: {}", e);
        }
    }
    AppConfig::load()
}

async fn answer(config: &AppConfig, question: &str) -> Result<PipelineOutcome> {
    let question = Question::new(question)?;
    cli::print_question(question.as_str());

    let executor = Arc::new(
        SqlExecutor::connect(&config.database, DbConnectionConfig::default()).await?,
    );
    let outcome = answer_with(config, executor.clone(), &question).await;
    executor.close().await;
    outcome
}

async fn answer_with(
    config: &AppConfig,
    executor: Arc<SqlExecutor>,
    question: &Question,
) -> Result<PipelineOutcome> {
    let schema = executor.describe_schema(SCHEMA_SAMPLE_ROWS).await?;
    tracing::info!(
        "Loaded schema '{}' with {} tables",
        config.database.schema,
        schema.tables.len()
    );

    let backend: Arc<dyn LLMClient + Send + Sync> = Arc::new(RouterClient::new(
        Duration::from_secs(config.llm_timeout_secs),
    ));
    let use_case = TextToSqlUseCase::new(
        ModelClient::new(backend.clone(), config.coder.clone()),
        ModelClient::new(backend, config.writer.clone()),
        executor,
        PromptBuilder::new(config.size_class),
        schema,
        config.result_limits.clone(),
    )
    .with_observer(Arc::new(DailyRunLog::new(config.log_dir.clone())));

    use_case.execute(question).await
}
