use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;

use super::engine::SearchResult;
use crate::error::PersistenceError;
use crate::scoring::{MetricName, MetricValue};

const LEADING_COLUMNS: [&str; 13] = [
    "config_id",
    "timestamp",
    "alpha",
    "gamma",
    "epsilon_decay",
    "epsilon_min",
    "status",
    "metrics_source",
    "win_rate",
    "draw_rate",
    "loss_rate",
    "states_learned",
    "total_episodes",
];

/// Append-only CSV log with one row per evaluated configuration.
#[derive(Debug, Clone)]
pub struct SearchLog {
    path: PathBuf,
}

impl SearchLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SearchLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header() -> Vec<&'static str> {
        let mut header = LEADING_COLUMNS.to_vec();
        header.extend(MetricName::ALL.iter().map(|m| m.as_str()));
        header.push("duration_secs");
        header.push("error");
        header
    }

    /// Create the file with its header row unless it already has content.
    pub fn ensure_header(&self) -> Result<(), PersistenceError> {
        self.open_writer().map(|_| ())
    }

    fn open_writer(&self) -> Result<csv::Writer<fs::File>, PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let needs_header = fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(Self::header())?;
            writer.flush()?;
        }
        Ok(writer)
    }

    pub fn append(&self, result: &SearchResult) -> Result<(), PersistenceError> {
        let mut writer = self.open_writer()?;
        writer.write_record(row(result))?;
        writer.flush()?;
        Ok(())
    }
}

fn row(result: &SearchResult) -> Vec<String> {
    let c = &result.config;
    let mut row = vec![
        result.config_id.to_string(),
        result.timestamp.clone(),
        c.alpha.to_string(),
        c.gamma.to_string(),
        c.epsilon_decay.to_string(),
        c.epsilon_min.to_string(),
    ];
    match &result.metrics {
        Some(m) => {
            row.push("ok".to_string());
            row.push(m.metrics_source.to_string());
            row.push(m.win_rate.to_string());
            row.push(m.draw_rate.to_string());
            row.push(m.loss_rate.to_string());
            row.push(m.states_learned.to_string());
            row.push(m.total_episodes.to_string());
            row.extend(m.iter().map(|(_, v)| cell(v)));
        }
        None => {
            row.push("failed".to_string());
            row.extend(std::iter::repeat(String::new()).take(6 + MetricName::ALL.len()));
        }
    }
    row.push(format!("{:.3}", result.duration_secs));
    row.push(result.error.clone().unwrap_or_default());
    row
}

fn cell(value: MetricValue) -> String {
    match value.value() {
        Some(v) => v.to_string(),
        None => "undefined".to_string(),
    }
}
