//! Prediction log: one CSV row per automatic forecast.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::prediction::Direction;
use crate::utils::errors::HistoryError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp:  DateTime<Utc>,
    pub direction:  Direction,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct PredictionHistory {
    path: PathBuf,
}

impl PredictionHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&self.path)?;
        let mut out = Vec::new();
        for row in rdr.deserialize() {
            out.push(row?);
        }
        Ok(out)
    }

    /// Read, append, then swap the file in with a rename so readers never see
    /// a half-written log.
    pub fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let mut all = self.load()?;
        all.push(entry);

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "history.csv".into());
        let tmp = dir.join(format!(".{file_name}.tmp"));

        {
            let mut wtr = csv::Writer::from_path(&tmp)?;
            for e in &all {
                wtr.serialize(e)?;
            }
            wtr.flush()?;
        }
        fs::File::open(&tmp)?.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Entries with `timestamp >= since`.
    pub fn recent(&self, since: DateTime<Utc>) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self.load()?.into_iter().filter(|e| e.timestamp >= since).collect())
    }
}
