use serde::{Deserialize, Serialize};
use std::fmt;

/// Content hash of a pipeline configuration (features, window, model, training).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigHash(pub String);

impl ConfigHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content hash of the training data (dates and values of the feature frame).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a published model state.
///
/// `generation` starts at 1 and increases by one per retrain;
/// `fingerprint` is the BLAKE3 hash of the serialized parameters and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelVersion {
    pub generation: u32,
    pub fingerprint: String,
}

impl ModelVersion {
    /// Short form used in file names and logs.
    pub fn short(&self) -> String {
        let n = self.fingerprint.len().min(12);
        format!("g{}-{}", self.generation, &self.fingerprint[..n])
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}:{}", self.generation, self.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_deterministic() {
        assert_eq!(ConfigHash::from_bytes(b"abc"), ConfigHash::from_bytes(b"abc"));
        assert_ne!(ConfigHash::from_bytes(b"abc"), ConfigHash::from_bytes(b"abd"));
        assert_eq!(DatasetHash::from_bytes(b"x").0.len(), 64);
    }

    #[test]
    fn short_version_is_truncated() {
        let v = ModelVersion {
            generation: 3,
            fingerprint: "0123456789abcdef".into(),
        };
        assert_eq!(v.short(), "g3-0123456789ab");
        assert_eq!(v.to_string(), "g3:0123456789abcdef");
    }
}
