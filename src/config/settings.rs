//! Runtime configuration settings

use super::analysis::AnalysisConfig;
use super::cli::AnalyzeArgs;
use crate::error::Result;
use crate::model::store::DEFAULT_MODEL;
use std::path::PathBuf;

/// Runtime settings for the batch analysis pipeline
#[derive(Debug, Clone)]
pub struct Settings {
    /// Input paths (files or directories)
    pub inputs: Vec<PathBuf>,
    /// Output directory
    pub output: PathBuf,
    /// Model name or checkpoint path
    pub model: String,
    /// Directory searched first for named checkpoints
    pub model_dir: Option<PathBuf>,
    /// Root of pre-separated stems
    pub stems_dir: Option<PathBuf>,
    /// Feature and decoder parameters
    pub analysis: AnalysisConfig,
    /// Write raw activations next to results
    pub save_activations: bool,
    /// Number of analysis worker threads
    pub analysis_threads: usize,
    /// Scan recursively
    pub recursive: bool,
    /// Overwrite existing results
    pub overwrite: bool,
    /// Show progress bars
    pub show_progress: bool,
    /// Dry run mode - show files without processing
    pub dry_run: bool,
}

impl Settings {
    /// Create settings from `analyze` arguments, reading `--config` if given
    pub fn from_cli(args: &AnalyzeArgs, quiet: bool) -> Result<Self> {
        let analysis = match &args.config {
            Some(path) => AnalysisConfig::load(path)?,
            None => AnalysisConfig::default(),
        };

        Ok(Self {
            inputs: args.paths.clone(),
            output: args.out_dir.clone(),
            model: args.model.clone(),
            model_dir: args.model_dir.clone(),
            stems_dir: args.stems_dir.clone(),
            analysis,
            save_activations: args.activ,
            analysis_threads: args.threads.unwrap_or_else(default_threads),
            recursive: !args.no_recursive,
            overwrite: args.overwrite,
            show_progress: !quiet,
            dry_run: args.dry_run,
        })
    }
}

/// One core is left for the main thread and export
fn default_threads() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inputs: vec![PathBuf::from(".")],
            output: PathBuf::from("./struct"),
            model: DEFAULT_MODEL.to_string(),
            model_dir: None,
            stems_dir: None,
            analysis: AnalysisConfig::default(),
            save_activations: false,
            analysis_threads: default_threads(),
            recursive: true,
            overwrite: false,
            show_progress: true,
            dry_run: false,
        }
    }
}
