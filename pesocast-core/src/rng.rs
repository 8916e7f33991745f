//! Deterministic RNG hierarchy.
//!
//! A master seed expands into sub-seeds per `(stream, index)` pair through
//! BLAKE3, so parameter initialisation, per-epoch shuffles and dropout masks
//! draw from independent streams that do not depend on call order.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Named random streams used by the trainer.
pub mod streams {
    pub const INIT: &str = "init";
    pub const SHUFFLE: &str = "shuffle";
    pub const DROPOUT: &str = "dropout";
}

#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Deterministic sub-seed for `(stream, index)`.
    pub fn sub_seed(&self, stream: &str, index: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(stream.as_bytes());
        hasher.update(&index.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn rng_for(&self, stream: &str, index: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(stream, index))
    }
}
