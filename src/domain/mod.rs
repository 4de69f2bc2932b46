pub mod error;
pub mod llm_config;
pub mod pipeline;
pub mod run_log;
pub mod schema;
