use crate::domain::error::{AppError, Result};
use crate::domain::run_log::RunLogEntry;
use chrono::NaiveDate;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Receives one record per pipeline step. Errors are reported by the caller
/// and never fail the run.
pub trait RunObserver {
    fn record(&self, entry: &RunLogEntry) -> Result<()>;
}

/// Appends JSON lines to `<dir>/<YYYY-MM-DD>.log`, one file per calendar day.
pub struct DailyRunLog {
    dir: PathBuf,
}

impl DailyRunLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.log", date.format("%Y-%m-%d")))
    }
}

impl RunObserver for DailyRunLog {
    fn record(&self, entry: &RunLogEntry) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(entry.timestamp.date_naive());
        let line = serde_json::to_string(entry)
            .map_err(|e| AppError::Internal(format!("Failed to serialize run record: {}", e)))?;

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}
