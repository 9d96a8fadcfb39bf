//! File-level evaluation
//!
//! Pairs result files with reference annotations and scores each pair.

use super::{evaluate, EvalConfig, Evaluation};
use crate::error::{AllInOneError, Result};
use crate::export;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Scores per track plus their mean
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub tracks: BTreeMap<String, Evaluation>,
    pub mean: Option<Evaluation>,
}

/// Score a prediction file or directory against a reference file or directory
///
/// Directories are paired by file name; predictions without a reference are
/// skipped with a warning. Activation dumps are ignored.
pub fn evaluate_paths(
    prediction: &Path,
    reference: &Path,
    config: &EvalConfig,
) -> Result<EvaluationReport> {
    config.validate()?;
    let pairs = if prediction.is_dir() {
        if !reference.is_dir() {
            return Err(AllInOneError::ConfigError(format!(
                "{} is a directory but {} is not",
                prediction.display(),
                reference.display()
            )));
        }
        pair_directories(prediction, reference)?
    } else {
        vec![(
            track_key(prediction),
            prediction.to_path_buf(),
            reference.to_path_buf(),
        )]
    };

    if pairs.is_empty() {
        return Err(AllInOneError::ConfigError(format!(
            "no prediction in {} has a matching reference in {}",
            prediction.display(),
            reference.display()
        )));
    }

    let mut tracks = BTreeMap::new();
    for (key, prediction_path, reference_path) in pairs {
        let estimate = export::read_track_json(&prediction_path)?;
        let truth = export::read_track_json(&reference_path)?;
        debug!("Scoring {} against {}", prediction_path.display(), reference_path.display());
        tracks.insert(key, evaluate(&estimate, &truth, config));
    }

    let scores: Vec<Evaluation> = tracks.values().cloned().collect();
    Ok(EvaluationReport {
        mean: Evaluation::mean(&scores),
        tracks,
    })
}

fn track_key(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_result_file(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.ends_with(".json") && !name.ends_with(".activ.json")
}

fn pair_directories(prediction: &Path, reference: &Path) -> Result<Vec<(String, PathBuf, PathBuf)>> {
    let mut pairs = Vec::new();
    for entry in std::fs::read_dir(prediction)? {
        let path = entry?.path();
        if !path.is_file() || !is_result_file(&path) {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let reference_path = reference.join(file_name);
        if reference_path.is_file() {
            pairs.push((track_key(&path), path, reference_path));
        } else {
            warn!("No reference for {}", path.display());
        }
    }
    pairs.sort();
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Segment, TrackAnalysis};
    use tempfile::TempDir;

    fn analysis(beats: Vec<f64>) -> TrackAnalysis {
        TrackAnalysis {
            path: PathBuf::new(),
            duration: 8.0,
            bpm: None,
            downbeats: vec![beats[0]],
            beats,
            beat_positions: Vec::new(),
            segments: vec![Segment { start: 0.0, end: 8.0, label: "verse".into() }],
        }
    }

    #[test]
    fn test_directories_paired_by_name() {
        let dir = TempDir::new().unwrap();
        let pred = dir.path().join("pred");
        let refs = dir.path().join("ref");
        std::fs::create_dir_all(&pred).unwrap();
        std::fs::create_dir_all(&refs).unwrap();

        let a = analysis(vec![0.0, 0.5, 1.0, 1.5]);
        export::write_track_json(&a, &pred.join("a.json")).unwrap();
        export::write_track_json(&a, &refs.join("a.json")).unwrap();
        export::write_track_json(&analysis(vec![0.0, 0.5]), &pred.join("b.json")).unwrap();
        export::write_track_json(&analysis(vec![3.0, 3.5]), &refs.join("b.json")).unwrap();
        export::write_track_json(&a, &pred.join("orphan.json")).unwrap();
        std::fs::write(pred.join("a.activ.json"), "{}").unwrap();

        let report = evaluate_paths(&pred, &refs, &EvalConfig::default()).unwrap();
        assert_eq!(report.tracks.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(report.tracks["a"].beats.f_measure, 1.0);
        assert_eq!(report.tracks["b"].beats.f_measure, 0.0);

        let mean = report.mean.unwrap();
        assert!((mean.beats.f_measure - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_single_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song.json");
        export::write_track_json(&analysis(vec![0.0, 0.5]), &path).unwrap();

        let report = evaluate_paths(&path, &path, &EvalConfig::default()).unwrap();
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.tracks["song"].pairwise.f_measure, 1.0);
    }

    #[test]
    fn test_tolerances_reach_the_scores() {
        let dir = TempDir::new().unwrap();
        let pred = dir.path().join("pred.json");
        let truth = dir.path().join("truth.json");
        // Every beat 0.1 s late
        export::write_track_json(&analysis(vec![0.1, 0.6, 1.1, 1.6]), &pred).unwrap();
        export::write_track_json(&analysis(vec![0.0, 0.5, 1.0, 1.5]), &truth).unwrap();

        let strict = evaluate_paths(&pred, &truth, &EvalConfig::default()).unwrap();
        assert_eq!(strict.tracks["pred"].beats.f_measure, 0.0);

        let loose = EvalConfig { event_tolerance: 0.15, ..EvalConfig::default() };
        let loose = evaluate_paths(&pred, &truth, &loose).unwrap();
        assert_eq!(loose.tracks["pred"].beats.f_measure, 1.0);
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song.json");
        export::write_track_json(&analysis(vec![0.0, 0.5]), &path).unwrap();
        let config = EvalConfig { frame_size: 0.0, ..EvalConfig::default() };
        let err = evaluate_paths(&path, &path, &config).unwrap_err();
        assert!(matches!(err, AllInOneError::ConfigError(_)));
    }

    #[test]
    fn test_no_pairs_is_an_error() {
        let dir = TempDir::new().unwrap();
        let pred = dir.path().join("pred");
        std::fs::create_dir_all(&pred).unwrap();
        assert!(evaluate_paths(&pred, dir.path(), &EvalConfig::default()).is_err());
    }
}
