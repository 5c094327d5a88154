use std::path::{Path, PathBuf};

use super::TournamentReport;
use crate::checkpoint::{read_json, write_json_atomic};
use crate::error::PersistenceError;

/// Append-only JSON list of tournament reports.
#[derive(Debug, Clone)]
pub struct TournamentHistory {
    path: PathBuf,
}

impl TournamentHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TournamentHistory { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored report, oldest first. A missing file is an empty history.
    pub fn load_all(&self) -> Result<Vec<TournamentReport>, PersistenceError> {
        match read_json(&self.path) {
            Ok(all) => Ok(all),
            Err(PersistenceError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Up to `limit` reports, most recent first.
    pub fn load(&self, limit: usize) -> Result<Vec<TournamentReport>, PersistenceError> {
        let mut all = self.load_all()?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }

    pub fn append(&self, report: &TournamentReport) -> Result<(), PersistenceError> {
        let mut all = self.load_all()?;
        all.push(report.clone());
        write_json_atomic(&self.path, &all)
    }
}
