use crate::models::MetricRow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One row that could not be persisted even on its own.
#[derive(Debug, Serialize)]
pub struct DeadLetter<'a> {
    pub failed_at: DateTime<Utc>,
    pub business_name: &'a str,
    pub batch_index: usize,
    pub error: String,
    pub row: &'a MetricRow,
}

/// Append-only NDJSON log, one file per business per day:
/// `<dir>/<business_slug>_YYYY-MM-DD.ndjson`.
#[derive(Debug, Clone)]
pub struct DeadLetterLog {
    dir: PathBuf,
}

impl DeadLetterLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, business_name: &str, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.ndjson", slug(business_name), day.format("%Y-%m-%d")))
    }

    pub fn append(&self, entry: &DeadLetter<'_>) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(entry.business_name, entry.failed_at.date_naive());
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{}", line)?;
        Ok(path)
    }
}

fn slug(name: &str) -> String {
    let s: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if s.is_empty() { "unnamed".to_string() } else { s }
}
