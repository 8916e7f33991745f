//! Training: optimizer, early stopping, the generic epoch loop and the trainer.

pub mod early_stopping;
pub mod learner;
pub mod optimizer;
pub mod trainer;

pub use early_stopping::{EarlyStopping, EarlyStoppingConfig, Verdict};
pub use learner::{run_epochs, EpochRecord, EpochRun, Learner};
pub use optimizer::{clip_global_norm, Adam};
pub use trainer::{TrainConfig, TrainError, TrainOutcome, Trainer, TrainingSet};
