//! Per-track JSON results
//!
//! One `<track>.json` per analyzed file holding the `TrackAnalysis`, plus an
//! optional `<track>.activ.json` with the raw frame activations.

use crate::error::{AllInOneError, Result};
use crate::types::{Activations, TrackAnalysis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path of the result file for a track
pub fn output_path_for(out_dir: &Path, track_name: &str) -> PathBuf {
    out_dir.join(format!("{}.json", track_name))
}

/// Path of the activation dump for a track
pub fn activations_path_for(out_dir: &Path, track_name: &str) -> PathBuf {
    out_dir.join(format!("{}.activ.json", track_name))
}

/// Raw activations as written with `--activ`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationsJson {
    pub frame_rate: f64,
    /// Column names of `label`
    pub label_names: Vec<String>,
    pub beat: Vec<f32>,
    pub downbeat: Vec<f32>,
    pub boundary: Vec<f32>,
    /// One probability row per frame
    pub label: Vec<Vec<f32>>,
}

impl ActivationsJson {
    pub fn new(activations: &Activations, label_names: &[String]) -> Self {
        Self {
            frame_rate: activations.frame_rate,
            label_names: label_names.to_vec(),
            beat: activations.beat.clone(),
            downbeat: activations.downbeat.clone(),
            boundary: activations.boundary.clone(),
            label: activations
                .labels
                .rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect(),
        }
    }
}

/// Write a track result
pub fn write_track_json(analysis: &TrackAnalysis, output_path: &Path) -> Result<()> {
    write_atomic(analysis, output_path)?;
    debug!(
        "Wrote {} beats, {} segments to {}",
        analysis.beats.len(),
        analysis.segments.len(),
        output_path.display()
    );
    Ok(())
}

/// Write raw activations next to a track result
pub fn write_activations_json(
    activations: &Activations,
    label_names: &[String],
    output_path: &Path,
) -> Result<()> {
    write_atomic(&ActivationsJson::new(activations, label_names), output_path)
}

/// Read a result or reference annotation file
pub fn read_track_json(path: &Path) -> Result<TrackAnalysis> {
    let file = File::open(path).map_err(|e| {
        AllInOneError::ConfigError(format!("cannot open {}: {}", path.display(), e))
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        AllInOneError::ConfigError(format!("invalid result file {}: {}", path.display(), e))
    })
}

/// Serialize to a temp file in the same directory, then rename over the target
///
/// Readers never observe a partially written result.
fn write_atomic<T: Serialize>(value: &T, output_path: &Path) -> Result<()> {
    let temp_path = output_path.with_extension("json.tmp");

    let file = File::create(&temp_path)
        .map_err(|e| AllInOneError::output_error(output_path, e))?;
    let mut writer = BufWriter::new(file);

    let written = serde_json::to_writer_pretty(&mut writer, value)
        .map_err(std::io::Error::from)
        .and_then(|()| writer.flush());
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(AllInOneError::output_error(output_path, e));
    }
    drop(writer);

    std::fs::rename(&temp_path, output_path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        AllInOneError::OutputError {
            path: output_path.to_path_buf(),
            reason: format!("Failed to finalize file: {}", e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Segment;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn sample_analysis() -> TrackAnalysis {
        TrackAnalysis {
            path: PathBuf::from("/music/song.wav"),
            duration: 4.0,
            bpm: Some(120.0),
            beats: vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5],
            downbeats: vec![0.0, 2.0],
            beat_positions: vec![1, 2, 3, 4, 1, 2, 3, 4],
            segments: vec![
                Segment { start: 0.0, end: 2.0, label: "intro".into() },
                Segment { start: 2.0, end: 4.0, label: "chorus".into() },
            ],
        }
    }

    #[test]
    fn test_write_then_read_result() {
        let dir = TempDir::new().unwrap();
        let path = output_path_for(dir.path(), "song");
        let analysis = sample_analysis();

        write_track_json(&analysis, &path).unwrap();
        assert_eq!(read_track_json(&path).unwrap(), analysis);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_reference_with_only_events() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ref.json");
        std::fs::write(
            &path,
            r#"{"beats": [0.5], "downbeats": [], "segments": [{"start": 0.0, "end": 1.0, "label": "intro"}]}"#,
        )
        .unwrap();

        let reference = read_track_json(&path).unwrap();
        assert_eq!(reference.beats, vec![0.5]);
        assert_eq!(reference.bpm, None);
        assert!(reference.beat_positions.is_empty());
    }

    #[test]
    fn test_unwritable_output() {
        let analysis = sample_analysis();
        let err = write_track_json(&analysis, Path::new("/nonexistent/dir/song.json")).unwrap_err();
        assert!(matches!(err, AllInOneError::OutputError { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_activations_file() {
        let dir = TempDir::new().unwrap();
        let path = activations_path_for(dir.path(), "song");
        assert!(path.to_string_lossy().ends_with("song.activ.json"));

        let activations = Activations {
            beat: vec![0.9, 0.1],
            downbeat: vec![0.8, 0.0],
            boundary: vec![0.0, 0.0],
            labels: Array2::from_shape_vec((2, 2), vec![0.7, 0.3, 0.4, 0.6]).unwrap(),
            frame_rate: 100.0,
        };
        let names = vec!["verse".to_string(), "chorus".to_string()];
        write_activations_json(&activations, &names, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: ActivationsJson = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.label, vec![vec![0.7, 0.3], vec![0.4, 0.6]]);
        assert_eq!(parsed.label_names, names);
        assert_eq!(parsed.frame_rate, 100.0);
    }
}
