//! Generic epoch loop: best-state retention, early stopping, divergence.

use serde::{Deserialize, Serialize};

use super::early_stopping::{EarlyStopping, EarlyStoppingConfig, Verdict};

/// Something that can be trained one epoch at a time.
pub trait Learner {
    type Snapshot: Clone;

    /// Run one pass over the training data; returns the mean training loss.
    fn train_epoch(&mut self, epoch: usize) -> f64;

    fn validation_loss(&self) -> f64;

    fn snapshot(&self) -> Self::Snapshot;
}

/// Per-epoch record, also written to the training history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: f64,
    pub improved: bool,
}

#[derive(Debug, Clone)]
pub struct EpochRun<S> {
    pub history: Vec<EpochRecord>,
    /// `(epoch, validation loss, snapshot)` of the best epoch.
    pub best: Option<(usize, f64, S)>,
    pub stopped_early: bool,
    /// First epoch with a non-finite loss, if any.
    pub diverged_at: Option<usize>,
}

/// Train for at most `max_epochs` (1-indexed), keeping the best snapshot.
pub fn run_epochs<L: Learner>(
    learner: &mut L,
    max_epochs: usize,
    early_stopping: EarlyStoppingConfig,
) -> EpochRun<L::Snapshot> {
    let mut stopper = EarlyStopping::new(early_stopping);
    let mut run = EpochRun {
        history: Vec::new(),
        best: None,
        stopped_early: false,
        diverged_at: None,
    };

    for epoch in 1..=max_epochs {
        let train_loss = learner.train_epoch(epoch);
        let validation_loss = learner.validation_loss();
        if !train_loss.is_finite() || !validation_loss.is_finite() {
            tracing::warn!(epoch, train_loss, validation_loss, "training diverged");
            run.diverged_at = Some(epoch);
            return run;
        }

        let verdict = stopper.observe(epoch, validation_loss);
        run.history.push(EpochRecord {
            epoch,
            train_loss,
            validation_loss,
            improved: verdict == Verdict::Improved,
        });
        tracing::debug!(epoch, train_loss, validation_loss, ?verdict, "epoch complete");

        match verdict {
            Verdict::Improved => run.best = Some((epoch, validation_loss, learner.snapshot())),
            Verdict::Stalled => {}
            Verdict::Stop => {
                if let Some((best_epoch, best_loss)) = stopper.best() {
                    tracing::info!(epoch, best_epoch, best_loss, "early stopping");
                }
                run.stopped_early = true;
                break;
            }
        }
    }
    run
}
