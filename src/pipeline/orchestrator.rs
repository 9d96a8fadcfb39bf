//! Pipeline orchestration
//!
//! Coordinates file discovery, model loading, parallel analysis and export.
//! Each track is decoded, analyzed and written by one rayon worker; the model
//! is shared read-only.

use crate::analysis::{self, ActivationModel, DirectoryStems, NoStems, StemProvider};
use crate::audio;
use crate::config::Settings;
use crate::decode;
use crate::discovery::{self, DiscoveredFile};
use crate::error::{AllInOneError, Result};
use crate::export;
use crate::model::store;
use crate::types::TrackAnalysis;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Pipeline result summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineResult {
    pub total_files: usize,
    pub successful: usize,
    /// Tracks that hit a per-track error
    pub failed: usize,
    /// Tracks with an existing result, or listed by a dry run
    pub skipped: usize,
}

/// Run the full analysis pipeline
pub fn run(settings: &Settings) -> Result<PipelineResult> {
    let pipeline_start = Instant::now();

    settings.analysis.validate()?;
    configure_thread_pool(settings.analysis_threads)?;

    // Phase 1: Discovery
    info!("Scanning for audio files...");
    let files = discovery::scan_all(&settings.inputs, settings.recursive)?;
    if files.is_empty() {
        return Ok(PipelineResult::default());
    }
    warn_on_name_collisions(&files);

    let (files_to_analyze, existing): (Vec<_>, Vec<_>) = files
        .into_iter()
        .partition(|f| settings.overwrite || !result_exists(&settings.output, f));

    if settings.dry_run {
        return Ok(run_dry_run(&files_to_analyze, existing.len(), settings));
    }

    if !existing.is_empty() {
        info!(
            "Skipping {} already-analyzed files (use --overwrite to re-analyze)",
            existing.len()
        );
    }

    let total_files = files_to_analyze.len() + existing.len();
    if files_to_analyze.is_empty() {
        info!("All files already analyzed, nothing to do");
        return Ok(PipelineResult {
            total_files,
            skipped: existing.len(),
            ..PipelineResult::default()
        });
    }

    std::fs::create_dir_all(&settings.output)
        .map_err(|e| AllInOneError::output_error(&settings.output, e))?;

    // Phase 2: Model
    let load_start = Instant::now();
    let model = store::load_model(&settings.model, settings.model_dir.as_deref())?;
    analysis::check_model(model.as_ref(), &settings.analysis)?;
    info!(
        "Loaded model '{}' in {:.2}s",
        model.name(),
        load_start.elapsed().as_secs_f64()
    );

    let stems: Box<dyn StemProvider> = match &settings.stems_dir {
        Some(dir) => Box::new(DirectoryStems::new(dir)),
        None => Box::new(NoStems),
    };
    debug!("Using stem provider '{}'", stems.name());

    // Phase 3: Analysis
    info!("Analyzing {} files", files_to_analyze.len());
    let analysis_start = Instant::now();
    let stats = analyze_files(&files_to_analyze, model.as_ref(), stems.as_ref(), settings)?;
    let analysis_elapsed = analysis_start.elapsed().as_secs_f64();
    info!(
        "Analysis completed in {:.2}s ({:.1} tracks/sec)",
        analysis_elapsed,
        if analysis_elapsed > 0.0 {
            files_to_analyze.len() as f64 / analysis_elapsed
        } else {
            0.0
        }
    );
    info!(
        "Total pipeline time: {:.2}s",
        pipeline_start.elapsed().as_secs_f64()
    );

    Ok(PipelineResult {
        total_files,
        successful: stats.successful,
        failed: stats.failed,
        skipped: existing.len(),
    })
}

fn result_exists(output: &Path, file: &DiscoveredFile) -> bool {
    let exists = export::output_path_for(output, &file.track_name()).is_file();
    if exists {
        debug!("Skipping {} (already analyzed)", file.path.display());
    }
    exists
}

/// Results are named by file stem, so equal stems overwrite each other
fn warn_on_name_collisions(files: &[DiscoveredFile]) {
    let mut seen: HashMap<String, &Path> = HashMap::new();
    for file in files {
        if let Some(previous) = seen.insert(file.track_name(), &file.path) {
            warn!(
                "{} and {} share the result name '{}'; only one result will be kept",
                previous.display(),
                file.path.display(),
                file.track_name()
            );
        }
    }
}

/// Dry run mode - show files that would be analyzed without processing
fn run_dry_run(files: &[DiscoveredFile], existing: usize, settings: &Settings) -> PipelineResult {
    println!();
    println!("=== DRY RUN MODE ===");
    println!();

    let mut by_directory: BTreeMap<PathBuf, Vec<&DiscoveredFile>> = BTreeMap::new();
    for file in files {
        let dir = file.path.parent().unwrap_or(&file.path).to_path_buf();
        by_directory.entry(dir).or_default().push(file);
    }

    for (dir, dir_files) in &by_directory {
        println!("{}/ ({} files)", dir.display(), dir_files.len());
        for file in dir_files {
            println!("  {} -> {}.json", file.path.display(), file.track_name());
        }
        println!();
    }

    println!("Would analyze {} files with model '{}'", files.len(), settings.model);
    if existing > 0 {
        println!("Would skip {} files with existing results", existing);
    }
    println!("Results would be written to {}", settings.output.display());
    println!();

    PipelineResult {
        total_files: files.len() + existing,
        skipped: files.len() + existing,
        ..PipelineResult::default()
    }
}

/// Configure the Rayon thread pool
fn configure_thread_pool(num_threads: usize) -> Result<()> {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        Ok(()) => {
            debug!("Configured thread pool with {} threads", num_threads);
        }
        Err(e) => {
            // Tests and library callers may have built the pool already
            if e.to_string().contains("already been initialized") {
                debug!("Thread pool already initialized, using existing pool");
            } else {
                return Err(AllInOneError::ConfigError(format!(
                    "Failed to configure thread pool: {}",
                    e
                )));
            }
        }
    }
    Ok(())
}

struct AnalysisStats {
    successful: usize,
    failed: usize,
}

/// Analyze files in parallel
///
/// Per-track errors are logged and counted. The first fatal error stops the
/// batch and is returned.
fn analyze_files(
    files: &[DiscoveredFile],
    model: &dyn ActivationModel,
    stems: &dyn StemProvider,
    settings: &Settings,
) -> Result<AnalysisStats> {
    let progress_bar = if settings.show_progress {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let outcome = files.par_iter().try_for_each(|file| {
        let result = analyze_single_file(file, model, stems, settings);

        if let Some(ref pb) = progress_bar {
            pb.inc(1);
            pb.set_message(file.track_name());
        }

        match result {
            Ok(analysis) => {
                debug!(
                    "Analyzed {}: {} beats, {} segments, BPM {}",
                    file.path.display(),
                    analysis.beats.len(),
                    analysis.segments.len(),
                    analysis.bpm.map(|b| format!("{:.1}", b)).unwrap_or_else(|| "-".into())
                );
                successful.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                warn!("Failed {}: {}", file.path.display(), e);
                failed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(e),
        }
    });

    if let Some(pb) = progress_bar {
        match outcome {
            Ok(()) => pb.finish_with_message("Analysis complete"),
            Err(_) => pb.abandon_with_message("Aborted"),
        }
    }
    outcome?;

    Ok(AnalysisStats {
        successful: successful.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    })
}

/// Decode, analyze and export one file
fn analyze_single_file(
    file: &DiscoveredFile,
    model: &dyn ActivationModel,
    stems: &dyn StemProvider,
    settings: &Settings,
) -> Result<TrackAnalysis> {
    debug!("Analyzing: {}", file.path.display());
    let name = file.track_name();

    let waveform = audio::decode(&file.path)?;
    let stem_set = stems.stems_for(&file.path)?;
    let activations =
        analysis::infer_activations(&waveform, stem_set.as_ref(), model, &settings.analysis)?;

    if settings.save_activations {
        export::write_activations_json(
            &activations,
            &settings.analysis.decoder.labels,
            &export::activations_path_for(&settings.output, &name),
        )?;
    }

    let mut result = decode::decode(&activations, &settings.analysis.decoder)?;
    result.path = file.path.clone();

    export::write_track_json(&result, &export::output_path_for(&settings.output, &name))?;
    Ok(result)
}
