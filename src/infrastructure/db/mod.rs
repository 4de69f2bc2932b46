pub mod executor;

use crate::domain::error::Result;
use crate::domain::pipeline::QueryResult;
use crate::domain::schema::SchemaContext;
use async_trait::async_trait;

/// Runs SQL against the configured database.
#[async_trait]
pub trait QueryExecutor {
    /// Execute one statement and return its rows in order.
    async fn execute(&self, sql: &str) -> Result<QueryResult>;

    /// Tables and columns of the current schema, with up to `sample_rows` rows each.
    async fn describe_schema(&self, sample_rows: usize) -> Result<SchemaContext>;
}
