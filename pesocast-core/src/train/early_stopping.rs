//! Patience-based early stopping on validation loss.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    /// Consecutive non-improving epochs tolerated before stopping.
    pub patience: usize,
    /// An epoch improves only if its loss is below `best - min_delta`.
    pub min_delta: f64,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            patience: 10,
            min_delta: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Improved,
    Stalled,
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    config: EarlyStoppingConfig,
    best: Option<(usize, f64)>,
    stalled: usize,
}

impl EarlyStopping {
    pub fn new(config: EarlyStoppingConfig) -> Self {
        Self {
            config,
            best: None,
            stalled: 0,
        }
    }

    /// `(epoch, loss)` of the best epoch so far.
    pub fn best(&self) -> Option<(usize, f64)> {
        self.best
    }

    pub fn observe(&mut self, epoch: usize, loss: f64) -> Verdict {
        let improved = match self.best {
            None => true,
            Some((_, best)) => loss < best - self.config.min_delta,
        };
        if improved {
            self.best = Some((epoch, loss));
            self.stalled = 0;
            return Verdict::Improved;
        }
        self.stalled += 1;
        if self.stalled >= self.config.patience {
            Verdict::Stop
        } else {
            Verdict::Stalled
        }
    }
}
