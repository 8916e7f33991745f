//! Versioned, checksummed JSON snapshot of a `ModelState`.
//!
//! Layout: `{ "format", "format_version", "checksum", "state" }`. The checksum
//! is the BLAKE3 hex digest of the canonical JSON encoding of `state`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::ModelState;

pub const SNAPSHOT_FORMAT: &str = "pesocast-model";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not a model snapshot (format '{0}')")]
    UnknownFormat(String),

    #[error("unsupported snapshot version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("snapshot checksum mismatch: recorded {recorded}, computed {computed}")]
    ChecksumMismatch { recorded: String, computed: String },

    #[error("snapshot fingerprint mismatch for model {0}")]
    FingerprintMismatch(String),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format: String,
    format_version: u32,
    checksum: String,
    state: serde_json::Value,
}

fn checksum(state: &serde_json::Value) -> Result<String, SnapshotError> {
    let bytes = serde_json::to_vec(state)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

impl ModelState {
    pub fn to_snapshot_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let state = serde_json::to_value(self)?;
        let envelope = Envelope {
            format: SNAPSHOT_FORMAT.to_string(),
            format_version: SNAPSHOT_VERSION,
            checksum: checksum(&state)?,
            state,
        };
        Ok(serde_json::to_vec_pretty(&envelope)?)
    }

    pub fn from_snapshot_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        if envelope.format != SNAPSHOT_FORMAT {
            return Err(SnapshotError::UnknownFormat(envelope.format));
        }
        if envelope.format_version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: envelope.format_version,
                supported: SNAPSHOT_VERSION,
            });
        }
        let computed = checksum(&envelope.state)?;
        if computed != envelope.checksum {
            return Err(SnapshotError::ChecksumMismatch {
                recorded: envelope.checksum,
                computed,
            });
        }
        let state: ModelState = serde_json::from_value(envelope.state)?;
        if state.compute_fingerprint() != state.version().fingerprint {
            return Err(SnapshotError::FingerprintMismatch(state.version().short()));
        }
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_snapshot_bytes()?)?;
        tracing::info!(model = %self.version().short(), path = %path.display(), "model snapshot saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let state = Self::from_snapshot_bytes(&std::fs::read(path)?)?;
        tracing::info!(model = %state.version().short(), path = %path.display(), "model snapshot loaded");
        Ok(state)
    }
}
