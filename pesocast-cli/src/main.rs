//! PesoCast CLI: train, predict, evaluate, inspect and prepare commands.
//!
//! Commands:
//! - `train`: train (or retrain) a model from a TOML pipeline config
//! - `predict`: forecast the next target date with the stored model
//! - `evaluate`: score a stored model on the held-out test partition
//! - `inspect`: show a stored model's schema, metadata and training history
//! - `prepare`: align and derive features, then write them to CSV
//!
//! Logs go to stderr; `RUST_LOG` overrides the default `info` level.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use pesocast_core::model::ModelState;
use pesocast_runner::export::{
    export_errors_csv, export_features_csv, export_predictions_csv, export_signals_csv,
};
use pesocast_runner::pipeline::{self, TrainReport};
use pesocast_runner::{check_compatibility, forecast, save_artifacts, ModelStore, PipelineConfig};

#[derive(Parser)]
#[command(
    name = "pesocast",
    about = "PesoCast CLI: USD/MXN forecasting pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model; retrains the store's latest generation when one exists.
    Train {
        /// Path to the pipeline TOML config.
        #[arg(long)]
        config: PathBuf,

        /// Model store directory.
        #[arg(long, default_value = "models")]
        models: PathBuf,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Forecast the next target date with a stored model.
    Predict {
        #[arg(long)]
        config: PathBuf,

        #[arg(long, default_value = "models")]
        models: PathBuf,

        /// Model generation. Defaults to the latest.
        #[arg(long)]
        generation: Option<u32>,

        /// Also write in-sample predictions to this CSV file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Score a stored model on the test partition of the configured data.
    Evaluate {
        #[arg(long)]
        config: PathBuf,

        #[arg(long, default_value = "models")]
        models: PathBuf,

        #[arg(long)]
        generation: Option<u32>,

        /// Directory for signals.csv and errors.csv.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Show a stored model's schema, metadata and training history.
    Inspect {
        #[arg(long, default_value = "models")]
        models: PathBuf,

        #[arg(long)]
        generation: Option<u32>,
    },
    /// Align series and build features without training.
    Prepare {
        #[arg(long)]
        config: PathBuf,

        /// Feature CSV destination.
        #[arg(long, default_value = "features.csv")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            config,
            models,
            output_dir,
        } => run_train(&config, &models, &output_dir),
        Commands::Predict {
            config,
            models,
            generation,
            output,
        } => run_predict(&config, &models, generation, output.as_deref()),
        Commands::Evaluate {
            config,
            models,
            generation,
            output_dir,
        } => run_evaluate(&config, &models, generation, output_dir.as_deref()),
        Commands::Inspect { models, generation } => run_inspect(&models, generation),
        Commands::Prepare { config, output } => run_prepare(&config, &output),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    PipelineConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))
}

fn load_model(store: &ModelStore, generation: Option<u32>) -> Result<ModelState> {
    match generation {
        Some(g) => Ok(store.load(g)?),
        None => match store.latest()? {
            Some(state) => Ok(state),
            None => bail!("no model in {}; run `pesocast train` first", store.dir().display()),
        },
    }
}

fn run_train(config_path: &Path, models: &Path, output_dir: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = ModelStore::new(models);
    let report = pipeline::train(&config, &store)?;
    print_train_summary(&report);

    let run_dir = save_artifacts(&report, output_dir)?;
    println!("Snapshot:  {}", report.snapshot.display());
    println!("Artifacts: {}", run_dir.display());
    Ok(())
}

fn print_train_summary(report: &TrainReport) {
    let state = &report.outcome.state;
    let meta = state.metadata();
    println!("=== Training Summary ===");
    println!("Model:            {}", state.version());
    println!("Epochs run:       {}", meta.epochs_run);
    println!("Best epoch:       {}", meta.best_epoch);
    println!("Best val loss:    {:.6}", meta.best_validation_loss);
    println!("Stopped early:    {}", report.outcome.stopped_early);
    if let Some(s) = state.residual_std() {
        println!("Residual std:     {s:.6}");
    }
    match report.test.as_ref().and_then(|t| t.report.metrics.as_ref()) {
        Some(m) => {
            println!("--- Test partition ({} forecasts) ---", m.count);
            println!("MAE:              {:.6}", m.mae);
            println!("RMSE:             {:.6}", m.rmse);
            println!("VaR ({:.0}%):        {:.6}", m.confidence_level * 100.0, m.var);
            println!("CVaR ({:.0}%):       {:.6}", m.confidence_level * 100.0, m.cvar);
            if let Some(h) = m.hit_rate {
                println!("Hit rate:         {:.2}%", h * 100.0);
            }
            println!("Total return:     {:.2}%", m.total_return * 100.0);
            println!("Max drawdown:     {:.2}%", m.max_drawdown * 100.0);
        }
        None => println!("No test forecasts (test partition too short)"),
    }
}

fn run_predict(
    config_path: &Path,
    models: &Path,
    generation: Option<u32>,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let state = load_model(&ModelStore::new(models), generation)?;
    let series = pipeline::load(&config)?;
    let prepared = pipeline::prepare(&config, &series)?;
    let result = forecast(&state, &config, &prepared, &prepared.features.frame)?;

    if let Some(path) = output {
        std::fs::write(path, export_predictions_csv(&result.history)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("In-sample predictions: {}", path.display());
    }

    let Some(latest) = result.latest else {
        bail!("the most recent rows do not form a complete window");
    };
    let json = serde_json::json!({
        "model": latest.model.to_string(),
        "as_of": latest.as_of,
        "target_date": latest.target_date,
        "reference": latest.reference,
        "forecast": latest.forecast,
        "predicted_return": latest.predicted_return(),
        "band": latest.band,
        "signal": result.signal,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn run_evaluate(
    config_path: &Path,
    models: &Path,
    generation: Option<u32>,
    output_dir: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let state = load_model(&ModelStore::new(models), generation)?;
    let series = pipeline::load(&config)?;
    let prepared = pipeline::prepare(&config, &series)?;
    check_compatibility(&state, &config, &prepared)?;
    let splits = pipeline::split(&config, &prepared)?;
    let eval = pipeline::evaluate_frame(&config, &state, &prepared, &splits.test)?;

    println!("=== Evaluation: {} ===", state.version());
    println!("Forecasts: {}", eval.predictions.len());
    match &eval.report.metrics {
        Some(m) => println!("{}", serde_json::to_string_pretty(m)?),
        None => println!("No realized values for the test partition yet"),
    }

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        std::fs::write(dir.join("signals.csv"), export_signals_csv(&eval.report.records)?)?;
        std::fs::write(dir.join("errors.csv"), export_errors_csv(&eval.errors)?)?;
        println!("Tables written to {}", dir.display());
    }
    Ok(())
}

fn run_inspect(models: &Path, generation: Option<u32>) -> Result<()> {
    let store = ModelStore::new(models);
    let state = load_model(&store, generation)?;
    let meta = state.metadata();

    println!("=== Model {} ===", state.version());
    println!("Target:          {}", state.target());
    println!("Inputs:          {}", state.inputs().join(", "));
    println!(
        "Window:          length {}, horizon {}, max gap {}",
        state.window().length,
        state.window().horizon,
        state.window().max_gap
    );
    println!("Architecture:    {}", serde_json::to_string(state.config())?);
    println!("Parameters:      {}", state.network().parameter_count());
    println!("Seed:            {}", meta.seed);
    println!(
        "Windows:         {} train / {} validation",
        meta.train_windows, meta.validation_windows
    );
    if let Some(end) = meta.train_end {
        println!("Trained through: {end}");
    }
    println!("Features:        {}", meta.feature_fingerprint);
    println!("Dataset:         {}", meta.dataset);

    let history = store.history().read_all()?;
    if !history.is_empty() {
        println!("--- History ---");
        for entry in &history {
            println!(
                "{}  {}  best epoch {:>3}  val {:.6}{}",
                entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                entry.model.short(),
                entry.best_epoch,
                entry.best_validation_loss,
                if entry.stopped_early { "  (early stop)" } else { "" }
            );
        }
    }
    Ok(())
}

fn run_prepare(config_path: &Path, output: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let series = pipeline::load(&config)?;
    let prepared = pipeline::prepare(&config, &series)?;
    let report = &prepared.features.report;

    std::fs::write(output, export_features_csv(&prepared.features.frame)?)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Aligned rows:    {}", report.input_rows);
    println!("Feature rows:    {}", report.output_rows);
    println!("Dropped warm-up: {}", report.dropped_warmup);
    println!("Dropped missing: {}", report.dropped_missing);
    println!("Features:        {}", prepared.feature_fingerprint);
    println!("Written to:      {}", output.display());
    Ok(())
}
