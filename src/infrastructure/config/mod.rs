//! Runtime settings
//!
//! Settings are layered with figment: an optional TOML file first, then the
//! process environment (a `.env` file is loaded into the environment by the CLI).
//! Environment values are merged as plain strings so `DB_PASS=0123` stays `0123`.
//! Everything is validated once into an immutable [`AppConfig`]; any problem is
//! reported as a `ConfigurationError` naming the offending key.

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use crate::domain::pipeline::{ResultLimits, SizeClass};
use crate::domain::schema::DbDriver;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use validator::Validate;

pub const DEFAULT_CONFIG_FILE: &str = "sql-copilot.toml";
pub const DEFAULT_SQL_MODEL: &str = "hf.co/StellaYoon/data-sql-7b-oracle-postgresql-v2:Q5_K_M";
pub const DEFAULT_NLP_MODEL: &str = "smollm2:latest";
pub const DEFAULT_DB_SCHEMA: &str = "text_to_sql";
pub const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434";

const ENV_KEYS: &[&str] = &[
    "DB_DRIVER",
    "DB_HOST",
    "DB_PORT",
    "DB_USER",
    "DB_PASS",
    "DB_SCHEMA",
    "SQL_MODEL",
    "NLP_MODEL",
    "NLP_PROMPT",
    "SQL_TEMPERATURE",
    "NLP_TEMPERATURE",
    "LLM_PROVIDER",
    "LLM_BASE_URL",
    "OLLAMA_BASE_URL",
    "LLM_API_KEY",
    "LLM_TIMEOUT_SECS",
    "LOG_DIR",
    "RESULT_MAX_ROWS",
    "RESULT_MAX_CHARS",
];

/// Values as they arrive from the providers, before any checking.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    #[serde(deserialize_with = "lossy_string")]
    db_driver: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    db_host: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    db_port: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    db_user: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    db_pass: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    db_schema: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    sql_model: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    nlp_model: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    nlp_prompt: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    sql_temperature: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    nlp_temperature: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    llm_provider: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    llm_base_url: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    ollama_base_url: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    llm_api_key: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    llm_timeout_secs: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    log_dir: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    result_max_rows: Option<String>,
    #[serde(deserialize_with = "lossy_string")]
    result_max_chars: Option<String>,
}

// TOML values keep their types, so `db_port = 3306` or `db_pass = 1234` arrives as a number.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Flag(bool),
}

fn lossy_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value
        .map(|scalar| match scalar {
            Scalar::Text(s) => s,
            Scalar::Unsigned(n) => n.to_string(),
            Scalar::Signed(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Flag(b) => b.to_string(),
        })
        .filter(|s| !s.trim().is_empty()))
}

#[derive(Clone, Validate)]
pub struct DatabaseConfig {
    pub driver: DbDriver,
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[validate(length(min = 1))]
    pub user: String,
    pub password: String,
    #[validate(length(min = 1))]
    pub schema: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Checks shared by both model configs.
#[derive(Debug, Validate)]
struct BackendSettings {
    #[validate(url)]
    base_url: String,
    #[validate(range(min = 1, max = 3600))]
    timeout_secs: u64,
    #[validate(range(min = 0.0, max = 2.0))]
    sql_temperature: f32,
    #[validate(range(min = 0.0, max = 2.0))]
    nlp_temperature: f32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    /// Coder model: question to SQL.
    pub coder: LLMConfig,
    /// Writer model: rows to answer.
    pub writer: LLMConfig,
    pub size_class: SizeClass,
    pub llm_timeout_secs: u64,
    pub log_dir: PathBuf,
    pub result_limits: ResultLimits,
}

impl AppConfig {
    /// Load from `COPILOT_CONFIG` (or `sql-copilot.toml`) and the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var("COPILOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(env_provider(vars));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let raw: RawSettings = figment.extract().map_err(|e| {
            AppError::ConfigurationError(format!("Failed to read settings: {}", e))
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self> {
        let driver = match raw.db_driver.as_deref() {
            Some(value) => DbDriver::from_str(value)?,
            None => DbDriver::MySql,
        };

        let database = DatabaseConfig {
            driver,
            host: required(raw.db_host, "DB_HOST")?,
            port: parse_or(raw.db_port, "DB_PORT", driver.default_port())?,
            user: required(raw.db_user, "DB_USER")?,
            password: required(raw.db_pass, "DB_PASS")?,
            schema: raw
                .db_schema
                .unwrap_or_else(|| DEFAULT_DB_SCHEMA.to_string()),
        };
        database.validate()?;

        let size_class = match raw.nlp_prompt.as_deref() {
            Some(value) => SizeClass::from_str(value)?,
            None => SizeClass::Short,
        };

        let provider = match raw.llm_provider.as_deref() {
            Some(value) => LLMProvider::from_str(value)?,
            None => LLMProvider::Ollama,
        };
        let base_url = raw
            .llm_base_url
            .or(raw.ollama_base_url)
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
        let llm_timeout_secs = parse_or(raw.llm_timeout_secs, "LLM_TIMEOUT_SECS", 120u64)?;
        let sql_temperature = parse_or(raw.sql_temperature, "SQL_TEMPERATURE", 0.0f32)?;
        let nlp_temperature = parse_or(raw.nlp_temperature, "NLP_TEMPERATURE", 0.3f32)?;

        BackendSettings {
            base_url: base_url.clone(),
            timeout_secs: llm_timeout_secs,
            sql_temperature,
            nlp_temperature,
        }
        .validate()?;

        let backend = LLMConfig {
            provider,
            base_url,
            model: String::new(),
            api_key: raw.llm_api_key,
            temperature: None,
        };
        let coder = backend.for_model(
            raw.sql_model.as_deref().unwrap_or(DEFAULT_SQL_MODEL),
            sql_temperature,
        );
        let writer = backend.for_model(
            raw.nlp_model.as_deref().unwrap_or(DEFAULT_NLP_MODEL),
            nlp_temperature,
        );

        let defaults = ResultLimits::default();
        let result_limits = ResultLimits {
            max_rows: parse_or(raw.result_max_rows, "RESULT_MAX_ROWS", defaults.max_rows)?,
            max_chars: parse_or(raw.result_max_chars, "RESULT_MAX_CHARS", defaults.max_chars)?,
            ..defaults
        };
        result_limits.validate()?;

        Ok(Self {
            database,
            coder,
            writer,
            size_class,
            llm_timeout_secs,
            log_dir: PathBuf::from(raw.log_dir.unwrap_or_else(|| "logs".to_string())),
            result_limits,
        })
    }
}

/// Known keys from `vars`, lowercased, with values left exactly as written.
fn env_provider<I, K, V>(vars: I) -> Serialized<BTreeMap<String, String>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let values = vars
        .into_iter()
        .filter(|(key, _)| ENV_KEYS.contains(&key.as_ref()))
        .map(|(key, value)| (key.as_ref().to_lowercase(), value.into()))
        .collect();
    Serialized::defaults(values)
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    value.ok_or_else(|| {
        AppError::ConfigurationError(format!("Missing required setting {}", key))
    })
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            AppError::ConfigurationError(format!("Invalid value for {}: '{}'", key, raw))
        }),
        None => Ok(default),
    }
}
