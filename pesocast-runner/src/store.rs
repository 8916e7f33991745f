//! Model store: snapshots by generation plus a JSONL training history.
//!
//! Layout of a store directory:
//! - `model-g0001.json`, `model-g0002.json`, ... one snapshot per generation
//! - `history.jsonl`, one [`HistoryEntry`] per completed training run
//!
//! Snapshots are written once and never rewritten. The history file is
//! append-only; a truncated or malformed line is skipped on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use pesocast_core::domain::{ConfigHash, ModelVersion};
use pesocast_core::model::{ModelState, SnapshotError};
use pesocast_core::signal::RiskMetrics;
use pesocast_core::train::EpochRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("model store I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("history entry could not be serialized: {0}")]
    Json(#[from] serde_json::Error),

    #[error("generation {generation} already exists at {path}")]
    GenerationExists { generation: u32, path: PathBuf },
}

/// Directory of model snapshots.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, generation: u32) -> PathBuf {
        self.dir.join(format!("model-g{generation:04}.json"))
    }

    fn parse_generation(path: &Path) -> Option<u32> {
        let name = path.file_name()?.to_str()?;
        name.strip_prefix("model-g")?.strip_suffix(".json")?.parse().ok()
    }

    /// Persist a state under its generation. Existing generations are never
    /// overwritten.
    pub fn save(&self, state: &ModelState) -> Result<PathBuf, StoreError> {
        let generation = state.version().generation;
        let path = self.snapshot_path(generation);
        if path.exists() {
            return Err(StoreError::GenerationExists { generation, path });
        }
        state.save(&path)?;
        Ok(path)
    }

    /// Generations present in the store, ascending.
    pub fn generations(&self) -> Result<Vec<u32>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut generations = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            if let Some(g) = Self::parse_generation(&entry?.path()) {
                generations.push(g);
            }
        }
        generations.sort_unstable();
        Ok(generations)
    }

    pub fn load(&self, generation: u32) -> Result<ModelState, StoreError> {
        Ok(ModelState::load(&self.snapshot_path(generation))?)
    }

    /// The highest generation, if any.
    pub fn latest(&self) -> Result<Option<ModelState>, StoreError> {
        match self.generations()?.last() {
            Some(&g) => self.load(g).map(Some),
            None => Ok(None),
        }
    }

    pub fn history(&self) -> TrainingHistory {
        TrainingHistory::new(self.dir.join("history.jsonl"))
    }
}

/// One completed training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub model: ModelVersion,
    pub config_fingerprint: ConfigHash,
    pub best_epoch: usize,
    pub best_validation_loss: f64,
    pub stopped_early: bool,
    pub epochs: Vec<EpochRecord>,
    /// Risk metrics on the held-out test partition, when it produced any.
    #[serde(default)]
    pub test_metrics: Option<RiskMetrics>,
}

/// Append-only JSONL file of [`HistoryEntry`] records.
#[derive(Debug, Clone)]
pub struct TrainingHistory {
    path: PathBuf,
}

impl TrainingHistory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        let json = serde_json::to_string(entry)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }

    /// All readable entries, oldest first.
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut entries = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), line = i + 1, error = %e, "skipping malformed history line")
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(generation: u32) -> HistoryEntry {
        HistoryEntry {
            recorded_at: Utc::now(),
            model: ModelVersion {
                generation,
                fingerprint: "ab".repeat(32),
            },
            config_fingerprint: ConfigHash::from_bytes(b"cfg"),
            best_epoch: 2,
            best_validation_loss: 0.4,
            stopped_early: true,
            epochs: vec![EpochRecord {
                epoch: 1,
                train_loss: 0.9,
                validation_loss: 0.5,
                improved: true,
            }],
            test_metrics: None,
        }
    }

    #[test]
    fn history_round_trips_and_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let history = ModelStore::new(dir.path().join("models")).history();
        assert!(history.read_all().unwrap().is_empty());

        history.append(&entry(1)).unwrap();
        {
            let mut f = OpenOptions::new().append(true).open(history.path()).unwrap();
            writeln!(f, "{{\"truncated\":").unwrap();
        }
        history.append(&entry(2)).unwrap();

        let entries = history.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].model.generation, 1);
        assert_eq!(entries[1].model.generation, 2);
        assert_eq!(entries[1], entry_with_time(entry(2), entries[1].recorded_at));
    }

    fn entry_with_time(mut e: HistoryEntry, t: DateTime<Utc>) -> HistoryEntry {
        e.recorded_at = t;
        e
    }

    #[test]
    fn generations_ignore_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());
        assert!(store.generations().unwrap().is_empty());
        assert!(store.latest().unwrap().is_none());

        for name in ["model-g0002.json", "model-g0010.json", "notes.txt", "model-gx.json"] {
            fs::write(dir.path().join(name), b"{}").unwrap();
        }
        assert_eq!(store.generations().unwrap(), vec![2, 10]);
    }

    #[test]
    fn missing_store_dir_has_no_generations() {
        let store = ModelStore::new("/nonexistent/pesocast/models");
        assert!(store.generations().unwrap().is_empty());
    }
}
