//! CLI argument parsing and configuration

use crate::eval::EvalConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// allin1 - Music structure analysis
///
/// Predicts beats, downbeats and functional segments (intro, verse, chorus,
/// ...) with a neighborhood-attention model, and scores results against
/// reference annotations.
#[derive(Parser, Debug)]
#[command(name = "allin1")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress progress bars and warnings)
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze audio files and write one JSON result per track
    Analyze(AnalyzeArgs),
    /// Score predicted results against reference annotations
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Audio files or directories to analyze
    #[arg(required = true, value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Output directory for result JSON files
    #[arg(short, long, value_name = "DIR", default_value = "./struct")]
    pub out_dir: PathBuf,

    /// Model name (harmonix-all, harmonix-fold0..7) or path to a .safetensors checkpoint
    #[arg(short, long, value_name = "NAME|PATH", default_value = crate::model::store::DEFAULT_MODEL)]
    pub model: String,

    /// Directory searched first for named checkpoints
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// Directory of pre-separated stems (<DIR>/<track>/{bass,drums,other,vocals}.wav)
    #[arg(long, value_name = "DIR")]
    pub stems_dir: Option<PathBuf>,

    /// JSON file with feature and decoder settings (missing fields use defaults)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write raw frame activations (<track>.activ.json)
    #[arg(long, default_value = "false")]
    pub activ: bool,

    /// Overwrite existing results (by default, skips already-analyzed files)
    #[arg(long, default_value = "false")]
    pub overwrite: bool,

    /// Number of worker threads (defaults to CPU count - 1)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Do not descend into subdirectories
    #[arg(long, default_value = "false")]
    pub no_recursive: bool,

    /// Dry run - list files that would be analyzed without processing
    #[arg(long, default_value = "false")]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Predicted result JSON, or a directory of them
    #[arg(short, long, value_name = "PATH")]
    pub prediction: PathBuf,

    /// Reference annotation JSON, or a directory of them (matched by file name)
    #[arg(short, long, value_name = "PATH")]
    pub reference: PathBuf,

    /// Beat and downbeat hit window in seconds [default: 0.07]
    #[arg(long, value_name = "SECS")]
    pub event_tolerance: Option<f64>,

    /// Narrow boundary hit window in seconds [default: 0.5]
    #[arg(long, value_name = "SECS")]
    pub boundary_window_narrow: Option<f64>,

    /// Wide boundary hit window in seconds [default: 3.0]
    #[arg(long, value_name = "SECS")]
    pub boundary_window_wide: Option<f64>,

    /// Sampling step for pairwise segment scores in seconds [default: 0.1]
    #[arg(long, value_name = "SECS")]
    pub frame_size: Option<f64>,
}

impl EvaluateArgs {
    /// Evaluation tolerances with command-line overrides applied
    pub fn eval_config(&self) -> EvalConfig {
        let defaults = EvalConfig::default();
        EvalConfig {
            event_tolerance: self.event_tolerance.unwrap_or(defaults.event_tolerance),
            boundary_window_narrow: self
                .boundary_window_narrow
                .unwrap_or(defaults.boundary_window_narrow),
            boundary_window_wide: self.boundary_window_wide.unwrap_or(defaults.boundary_window_wide),
            frame_size: self.frame_size.unwrap_or(defaults.frame_size),
        }
    }
}

impl Cli {
    /// Get the log level based on verbosity flags
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
