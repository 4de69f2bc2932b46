use crate::domain::error::AppError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Database engine the executor talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbDriver {
    Postgres,
    MySql,
}

impl DbDriver {
    pub fn default_port(&self) -> u16 {
        match self {
            DbDriver::Postgres => 5432,
            DbDriver::MySql => 3306,
        }
    }

    /// Dialect name as shown to the coder model.
    pub fn dialect(&self) -> &'static str {
        match self {
            DbDriver::Postgres => "PostgreSQL",
            DbDriver::MySql => "MySQL",
        }
    }

    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            DbDriver::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
            DbDriver::MySql => format!("`{}`", name.replace('`', "``")),
        }
    }
}

impl FromStr for DbDriver {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DbDriver::Postgres),
            "mysql" | "mariadb" => Ok(DbDriver::MySql),
            other => Err(AppError::ConfigurationError(format!(
                "DB_DRIVER must be 'postgres' or 'mysql', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    /// Sample rows rendered as text, one entry per column.
    pub sample_rows: Vec<Vec<String>>,
}

/// Schema description read once at startup and embedded in SQL prompts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaContext {
    pub driver: DbDriver,
    pub tables: Vec<TableSchema>,
}

impl SchemaContext {
    pub fn new(driver: DbDriver, tables: Vec<TableSchema>) -> Self {
        Self { driver, tables }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_driver() {
        assert_eq!("PostgreSQL".parse::<DbDriver>().unwrap(), DbDriver::Postgres);
        assert_eq!("mysql".parse::<DbDriver>().unwrap(), DbDriver::MySql);
        assert!("oracle".parse::<DbDriver>().is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(DbDriver::Postgres.quote_identifier("order"), "\"order\"");
        assert_eq!(DbDriver::MySql.quote_identifier("a`b"), "`a``b`");
    }
}
