pub mod prompt_builder;
pub mod result_sanitizer;
pub mod sql_sanitizer;
pub mod text_to_sql;
