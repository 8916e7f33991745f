//! PesoCast Core: USD/MXN forecasting pipeline without I/O.
//!
//! - Domain types (series points, predictions, signals, identities)
//! - Data normalizer aligning raw series onto a common date axis
//! - Causal feature builder
//! - Windowing engine and chronological split
//! - Stacked LSTM sequence model with a versioned snapshot format
//! - Trainer with Adam, early stopping and seeded determinism
//! - Signal and risk evaluator
//! - Lexicon sentiment scorer for headlines

pub mod data;
pub mod domain;
pub mod features;
pub mod lexicon;
pub mod model;
pub mod rng;
pub mod signal;
pub mod train;
pub mod window;
