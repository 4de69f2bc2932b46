use crate::domain::error::AppError;
use crate::domain::pipeline::PipelineOutcome;
use clap::Parser;
use std::path::Path;

pub const DEFAULT_QUESTION: &str = "Which customer has placed the least orders?";

const BANNER_WIDTH: usize = 50;
const REPORT_WIDTH: usize = 60;

/// SQL Copilot - ask a database a question in plain English
#[derive(Parser, Debug)]
#[command(name = "sql-copilot")]
#[command(version)]
#[command(about = "Translate a question into SQL, run it, and answer in plain English", long_about = None)]
pub struct Cli {
    /// Question to answer (defaults to an example question)
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,
}

impl Cli {
    pub fn question(&self) -> &str {
        self.question.as_deref().unwrap_or(DEFAULT_QUESTION)
    }
}

pub fn print_banner() {
    println!("\n{}", "=".repeat(BANNER_WIDTH));
    println!("Welcome to SQL Copilot");
    println!("{}\n", "=".repeat(BANNER_WIDTH));
}

pub fn print_question(question: &str) {
    println!("Processing question: {}...", question);
}

pub fn format_outcome(outcome: &PipelineOutcome) -> String {
    let rule = "=".repeat(REPORT_WIDTH);
    format!(
        "{rule}\nQUESTION : {}\nSQL QUERY: {}\nANSWER   : {}\nTIME     : {:.2}s\n{rule}",
        outcome.question,
        outcome.sql_query,
        outcome.answer.trim(),
        outcome.timings.total,
        rule = rule
    )
}

pub fn print_outcome(outcome: &PipelineOutcome, log_dir: &Path) {
    println!("\n{}", format_outcome(outcome));
    println!("\nCheck {} for detailed execution records.\n", log_dir.display());
}

pub fn print_failure(err: &AppError) {
    eprintln!("ERROR [{}]: {}", err.kind(), err);
}
