//! SQL executor for the copilot pipeline
//!
//! Connects to PostgreSQL or MySQL through a sqlx pool capped at one
//! connection. Every call acquires the connection for its own scope, so the
//! connection goes back to the pool on every exit path, including timeouts and
//! driver errors. Statements are run as given; the SQL sanitizer upstream is
//! responsible for shape checks.

use super::QueryExecutor;
use crate::domain::error::{AppError, Result};
use crate::domain::pipeline::{cell_text, QueryResult};
use crate::domain::schema::{ColumnInfo, DbDriver, SchemaContext, TableSchema};
use crate::infrastructure::config::DatabaseConfig;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column, MySql, Pool, Postgres, Row};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest sample cell shown to the coder model.
const SAMPLE_CELL_CHARS: usize = 100;

/// Configuration for the executor pool
#[derive(Debug, Clone)]
pub struct DbConnectionConfig {
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Query timeout in seconds
    pub query_timeout_secs: u64,
    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
}

impl Default for DbConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            query_timeout_secs: 30,
            idle_timeout_secs: 300,
        }
    }
}

enum DbPool {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
}

pub struct SqlExecutor {
    pool: DbPool,
    driver: DbDriver,
    config: DbConnectionConfig,
}

impl SqlExecutor {
    pub async fn connect(database: &DatabaseConfig, config: DbConnectionConfig) -> Result<Self> {
        let acquire_timeout = Duration::from_secs(config.connect_timeout_secs);
        let idle_timeout = Duration::from_secs(config.idle_timeout_secs);

        let pool = match database.driver {
            DbDriver::Postgres => {
                let options = PgConnectOptions::new()
                    .host(&database.host)
                    .port(database.port)
                    .database(&database.schema)
                    .username(&database.user)
                    .password(&database.password);
                let pool = PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(format!("Failed to connect to PostgreSQL: {}", e))
                    })?;
                DbPool::Postgres(pool)
            }
            DbDriver::MySql => {
                let options = MySqlConnectOptions::new()
                    .host(&database.host)
                    .port(database.port)
                    .database(&database.schema)
                    .username(&database.user)
                    .password(&database.password);
                let pool = MySqlPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(format!("Failed to connect to MySQL: {}", e))
                    })?;
                DbPool::MySql(pool)
            }
        };

        info!(
            "Database connected: {} at {}:{} ({})",
            database.schema,
            database.host,
            database.port,
            database.driver.dialect()
        );

        Ok(Self {
            pool,
            driver: database.driver,
            config,
        })
    }

    pub async fn close(&self) {
        match &self.pool {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::MySql(pool) => pool.close().await,
        }
    }

    async fn with_timeout<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        tokio::time::timeout(Duration::from_secs(self.config.query_timeout_secs), fut)
            .await
            .map_err(|_| {
                AppError::DatabaseError(format!(
                    "{} timed out after {} seconds",
                    what, self.config.query_timeout_secs
                ))
            })?
            .map_err(|e| AppError::DatabaseError(format!("{} failed: {}", what, e)))
    }

    async fn list_columns(&self) -> Result<Vec<(String, String, String)>> {
        let query = match self.driver {
            DbDriver::Postgres => {
                r#"
                SELECT
                    table_name::text AS table_name,
                    column_name::text AS column_name,
                    data_type::text AS data_type
                FROM information_schema.columns
                WHERE table_schema = current_schema()
                ORDER BY table_name, ordinal_position
            "#
            }
            DbDriver::MySql => {
                r#"
                SELECT
                    CAST(table_name AS CHAR) AS table_name,
                    CAST(column_name AS CHAR) AS column_name,
                    CAST(column_type AS CHAR) AS data_type
                FROM information_schema.columns
                WHERE table_schema = DATABASE()
                ORDER BY table_name, ordinal_position
            "#
            }
        };

        let result = self.execute(query).await?;
        let mut columns = Vec::with_capacity(result.row_count);
        for row in 0..result.row_count {
            columns.push((
                cell_text(result.cell(row, "table_name")),
                cell_text(result.cell(row, "column_name")),
                cell_text(result.cell(row, "data_type")),
            ));
        }
        Ok(columns)
    }

    async fn sample_rows(&self, table: &TableSchema, limit: usize) -> Vec<Vec<String>> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            self.driver.quote_identifier(&table.table_name),
            limit
        );

        match self.execute(&sql).await {
            Ok(result) => (0..result.row_count)
                .map(|row| {
                    table
                        .columns
                        .iter()
                        .map(|col| {
                            let text = cell_text(result.cell(row, &col.column_name));
                            text.chars()
                                .map(|c| if c.is_control() { ' ' } else { c })
                                .take(SAMPLE_CELL_CHARS)
                                .collect()
                        })
                        .collect()
                })
                .collect(),
            Err(e) => {
                warn!("Skipping sample rows for '{}': {}", table.table_name, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl QueryExecutor for SqlExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        debug!("Executing SQL: {}", sql);

        match &self.pool {
            DbPool::Postgres(pool) => {
                let mut conn = pool.acquire().await.map_err(|e| {
                    AppError::DatabaseError(format!("Failed to acquire connection: {}", e))
                })?;
                let rows = self
                    .with_timeout("Query", sqlx::query(sql).fetch_all(&mut *conn))
                    .await?;
                Ok(collect_rows(&rows, extract_pg_value))
            }
            DbPool::MySql(pool) => {
                let mut conn = pool.acquire().await.map_err(|e| {
                    AppError::DatabaseError(format!("Failed to acquire connection: {}", e))
                })?;
                let rows = self
                    .with_timeout("Query", sqlx::query(sql).fetch_all(&mut *conn))
                    .await?;
                Ok(collect_rows(&rows, extract_mysql_value))
            }
        }
    }

    async fn describe_schema(&self, sample_rows: usize) -> Result<SchemaContext> {
        let mut tables: Vec<TableSchema> = Vec::new();
        for (table_name, column_name, data_type) in self.list_columns().await? {
            let column = ColumnInfo {
                column_name,
                data_type,
            };
            match tables.last_mut() {
                Some(last) if last.table_name == table_name => last.columns.push(column),
                _ => tables.push(TableSchema {
                    table_name,
                    columns: vec![column],
                    sample_rows: Vec::new(),
                }),
            }
        }

        if sample_rows > 0 {
            for i in 0..tables.len() {
                let samples = self.sample_rows(&tables[i], sample_rows).await;
                tables[i].sample_rows = samples;
            }
        }

        info!("Loaded schema: {} tables", tables.len());
        Ok(SchemaContext::new(self.driver, tables))
    }
}

fn collect_rows<R, F>(rows: &[R], extract: F) -> QueryResult
where
    R: Row,
    F: Fn(&R, usize) -> serde_json::Value,
{
    let columns = match rows.first() {
        Some(row) => unique_column_names(row.columns().iter().map(|c| c.name())),
        None => Vec::new(),
    };
    let mut rows_json: Vec<HashMap<String, serde_json::Value>> = Vec::with_capacity(rows.len());

    for row in rows {
        let row_map = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), extract(row, i)))
            .collect();
        rows_json.push(row_map);
    }

    QueryResult::new(columns, rows_json)
}

/// `SELECT a.id, b.id` yields two `id` columns; later ones become `id_2`, `id_3`.
fn unique_column_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.collect();
    let mut taken: HashSet<String> = names.iter().map(|n| n.to_string()).collect();
    let mut seen: HashSet<&str> = HashSet::new();

    names
        .iter()
        .map(|&name| {
            if seen.insert(name) {
                return name.to_string();
            }
            let mut suffix = 2;
            loop {
                let candidate = format!("{}_{}", name, suffix);
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
                suffix += 1;
            }
        })
        .collect()
}

fn float_value(n: f64) -> serde_json::Value {
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Try each decoder in turn; the first type the driver accepts wins.
macro_rules! decode_first {
    ($row:expr, $index:expr, $( $ty:ty => $map:expr ),+ $(,)?) => {{
        $(
            if let Ok(v) = $row.try_get::<Option<$ty>, _>($index) {
                return v.map($map).unwrap_or(serde_json::Value::Null);
            }
        )+
        serde_json::Value::Null
    }};
}

/// Extract a column value from a PostgreSQL row as serde_json::Value
fn extract_pg_value(row: &PgRow, index: usize) -> serde_json::Value {
    decode_first!(row, index,
        String => serde_json::Value::String,
        i64 => |n: i64| serde_json::Value::Number(n.into()),
        i32 => |n: i32| serde_json::Value::Number(n.into()),
        i16 => |n: i16| serde_json::Value::Number(n.into()),
        f64 => float_value,
        f32 => |n: f32| float_value(n as f64),
        bool => serde_json::Value::Bool,
        BigDecimal => |d: BigDecimal| serde_json::Value::String(d.to_string()),
        chrono::DateTime<chrono::Utc> => |dt: chrono::DateTime<chrono::Utc>| serde_json::Value::String(dt.to_rfc3339()),
        chrono::NaiveDateTime => |dt: chrono::NaiveDateTime| serde_json::Value::String(dt.to_string()),
        chrono::NaiveDate => |d: chrono::NaiveDate| serde_json::Value::String(d.to_string()),
        chrono::NaiveTime => |t: chrono::NaiveTime| serde_json::Value::String(t.to_string()),
    )
}

/// Extract a column value from a MySQL row as serde_json::Value
fn extract_mysql_value(row: &MySqlRow, index: usize) -> serde_json::Value {
    decode_first!(row, index,
        String => serde_json::Value::String,
        i64 => |n: i64| serde_json::Value::Number(n.into()),
        u64 => |n: u64| serde_json::Value::Number(n.into()),
        i32 => |n: i32| serde_json::Value::Number(n.into()),
        i16 => |n: i16| serde_json::Value::Number(n.into()),
        i8 => |n: i8| serde_json::Value::Number(n.into()),
        f64 => float_value,
        f32 => |n: f32| float_value(n as f64),
        bool => serde_json::Value::Bool,
        BigDecimal => |d: BigDecimal| serde_json::Value::String(d.to_string()),
        chrono::NaiveDateTime => |dt: chrono::NaiveDateTime| serde_json::Value::String(dt.to_string()),
        chrono::DateTime<chrono::Utc> => |dt: chrono::DateTime<chrono::Utc>| serde_json::Value::String(dt.to_rfc3339()),
        chrono::NaiveDate => |d: chrono::NaiveDate| serde_json::Value::String(d.to_string()),
        chrono::NaiveTime => |t: chrono::NaiveTime| serde_json::Value::String(t.to_string()),
        Vec<u8> => |b: Vec<u8>| serde_json::Value::String(String::from_utf8_lossy(&b).into_owned()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_value_handles_nan() {
        assert_eq!(float_value(f64::NAN), serde_json::Value::Null);
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
    }

    #[test]
    fn test_duplicate_column_names_are_suffixed() {
        let names = unique_column_names(["id", "name", "id", "id"].into_iter());
        assert_eq!(names, vec!["id", "name", "id_2", "id_3"]);

        let names = unique_column_names(["id", "id_2", "id"].into_iter());
        assert_eq!(names, vec!["id", "id_2", "id_3"]);

        let names = unique_column_names(["total"].into_iter());
        assert_eq!(names, vec!["total"]);
    }

    #[test]
    fn test_default_connection_config() {
        let config = DbConnectionConfig::default();
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.query_timeout_secs, 30);
    }
}
