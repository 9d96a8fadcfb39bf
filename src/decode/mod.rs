//! Event decoding: activations to beats, downbeats and segments
//!
//! Decoding is deterministic and never looks at audio. Downbeats are chosen
//! from the decoded beats, so they share their timestamps exactly. Segments
//! tile `[0, duration)` without gaps or overlaps.
//!
//! # Defaults
//!
//! Tempo range 55..215 BPM, beat and downbeat thresholds 0.2, snap tolerance
//! 70 ms, boundary window ±12 s, minimum segment 4 s, Harmonix label set.

pub mod beats;
pub mod peaks;
pub mod segments;

pub use beats::{beat_positions, decode_beat_frames, decode_downbeat_frames, estimate_bpm};
pub use segments::decode_segments;

use crate::error::{AllInOneError, Result};
use crate::types::{Activations, TrackAnalysis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Harmonix functional labels, in model output order
pub const HARMONIX_LABELS: [&str; 10] = [
    "start", "end", "intro", "outro", "break", "bridge", "inst", "solo", "verse", "chorus",
];

/// How per-frame label distributions become one segment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelAggregation {
    /// Average the distributions, then take the most probable label
    #[default]
    MeanArgmax,
    /// Most frequent per-frame winner
    Majority,
}

/// Decoder parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Beat gaps slower than this are pauses, not beat periods
    pub min_bpm: f64,
    /// Sets the minimum distance between beats
    pub max_bpm: f64,
    pub beat_threshold: f32,
    pub downbeat_threshold: f32,
    /// Seconds a downbeat peak may sit from its beat
    pub snap_tolerance: f64,
    /// Allowed bar-spacing error as a fraction of the local inter-beat interval
    pub meter_tolerance: f64,
    pub boundary_threshold: f32,
    /// Half-width of the boundary peak neighborhood, in seconds
    pub boundary_window: f64,
    pub min_segment_duration: f64,
    /// Names of the model's label classes, in output order
    pub labels: Vec<String>,
    /// Label for tracks whose dominant label is too uncertain
    pub default_label: String,
    pub min_label_confidence: f32,
    pub label_aggregation: LabelAggregation,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            min_bpm: 55.0,
            max_bpm: 215.0,
            beat_threshold: 0.2,
            downbeat_threshold: 0.2,
            snap_tolerance: 0.07,
            meter_tolerance: 0.25,
            boundary_threshold: 0.1,
            boundary_window: 12.0,
            min_segment_duration: 4.0,
            labels: HARMONIX_LABELS.iter().map(|s| s.to_string()).collect(),
            default_label: "unknown".to_string(),
            min_label_confidence: 0.2,
            label_aggregation: LabelAggregation::MeanArgmax,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_bpm > 0.0 && self.max_bpm > self.min_bpm) {
            return Err(AllInOneError::ConfigError(format!(
                "tempo range {}..{} BPM is invalid",
                self.min_bpm, self.max_bpm
            )));
        }
        for (name, value) in [
            ("beat_threshold", self.beat_threshold),
            ("downbeat_threshold", self.downbeat_threshold),
            ("boundary_threshold", self.boundary_threshold),
            ("min_label_confidence", self.min_label_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AllInOneError::ConfigError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.snap_tolerance < 0.0
            || self.meter_tolerance < 0.0
            || self.boundary_window < 0.0
            || self.min_segment_duration < 0.0
        {
            return Err(AllInOneError::ConfigError(
                "decoder durations and tolerances must not be negative".to_string(),
            ));
        }
        if self.labels.is_empty() {
            return Err(AllInOneError::ConfigError("label set is empty".to_string()));
        }
        Ok(())
    }

    /// Smallest beat spacing in frames, rounded up so that the spacing in
    /// seconds never drops below `60 / max_bpm`
    pub fn min_beat_distance_frames(&self, frame_rate: f64) -> usize {
        ((60.0 / self.max_bpm * frame_rate) - 1e-9).ceil().max(1.0) as usize
    }

    /// Largest gap in frames still read as one beat period (`60 / min_bpm`)
    pub fn max_beat_distance_frames(&self, frame_rate: f64) -> usize {
        ((60.0 / self.min_bpm * frame_rate) + 1e-9).floor().max(1.0) as usize
    }
}

/// Decode all events of one track
///
/// Fails with `NoBeatsDetected` when the beat curve never reaches
/// `beat_threshold`; the error still carries the decoded segments.
pub fn decode(activations: &Activations, config: &DecoderConfig) -> Result<TrackAnalysis> {
    config.validate()?;
    activations.validate()?;
    if activations.is_empty() {
        return Err(AllInOneError::EmptyInput {
            what: "activation sequence".to_string(),
        });
    }

    let segments = decode_segments(activations, config)?;
    let beat_frames = match decode_beat_frames(activations, config) {
        Err(AllInOneError::NoBeatsDetected { peak, threshold, .. }) => {
            return Err(AllInOneError::NoBeatsDetected {
                peak,
                threshold,
                segments,
            });
        }
        result => result?,
    };
    let downbeat_frames = decode_downbeat_frames(activations, &beat_frames, config);

    let to_time = |frames: &[usize]| -> Vec<f64> {
        frames.iter().map(|&f| activations.frame_time(f)).collect()
    };
    let beats = to_time(&beat_frames);
    let downbeats = to_time(&downbeat_frames);
    let bpm = estimate_bpm(&beats, config.min_bpm);

    debug!(
        "Decoded {} beats, {} downbeats, {} segments",
        beats.len(),
        downbeats.len(),
        segments.len()
    );

    Ok(TrackAnalysis {
        path: PathBuf::new(),
        duration: activations.duration(),
        bpm,
        beat_positions: beat_positions(&beat_frames, &downbeat_frames),
        beats,
        downbeats,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// 120 BPM click at 100 fps: beats every 50 frames, downbeats every 200
    fn click_activations(seconds: usize) -> Activations {
        let n = seconds * 100;
        let mut beat = vec![0.02f32; n];
        let mut downbeat = vec![0.02f32; n];
        for t in (0..n).step_by(50) {
            beat[t] = 0.95;
            downbeat[t] = if t % 200 == 0 { 0.9 } else { 0.1 };
            if t + 1 < n {
                beat[t + 1] = 0.4;
            }
        }

        // Boundary at 16 s, intro then verse
        let mut boundary = vec![0.01f32; n];
        boundary[1600] = 0.9;
        let mut labels = Array2::from_elem((n, 10), 0.02f32);
        for t in 0..n {
            let class = if t < 1600 { 2 } else { 8 };
            labels[[t, class]] = 0.82;
        }

        Activations {
            beat,
            downbeat,
            boundary,
            labels,
            frame_rate: 100.0,
        }
    }

    fn assert_consistent(analysis: &TrackAnalysis, config: &DecoderConfig) {
        // Downbeats are a subset of beats, by identical timestamp
        assert!(analysis.downbeats.iter().all(|d| analysis.beats.contains(d)));
        // Ordered beats with the minimum spacing
        let min_ibi = 60.0 / config.max_bpm;
        assert!(analysis.beats.windows(2).all(|w| w[1] - w[0] >= min_ibi - 1e-9));
        // Segments tile the track
        assert_eq!(analysis.segments.first().map(|s| s.start), Some(0.0));
        assert_eq!(analysis.segments.last().map(|s| s.end), Some(analysis.duration));
        assert!(analysis.segments.windows(2).all(|w| w[0].end == w[1].start));
        assert!(analysis.segments.iter().all(|s| s.end > s.start));
        assert_eq!(analysis.beat_positions.len(), analysis.beats.len());
    }

    #[test]
    fn test_click_track_scenario() {
        let config = DecoderConfig::default();
        let analysis = decode(&click_activations(32), &config).unwrap();
        assert_consistent(&analysis, &config);

        assert_eq!(analysis.beats.len(), 64);
        for (i, &t) in analysis.beats.iter().enumerate() {
            assert!((t - i as f64 * 0.5).abs() < 1e-9);
        }
        assert_eq!(analysis.downbeats.len(), 16);
        for (i, &t) in analysis.downbeats.iter().enumerate() {
            assert!((t - i as f64 * 2.0).abs() < 1e-9);
        }
        assert!((analysis.bpm.unwrap() - 120.0).abs() < 1e-6);
        assert_eq!(&analysis.beat_positions[..6], &[1, 2, 3, 4, 1, 2]);

        assert_eq!(analysis.segments.len(), 2);
        assert_eq!(analysis.segments[0].label, "intro");
        assert_eq!(analysis.segments[1].label, "verse");
        assert!((analysis.segments[1].start - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_decoding_is_idempotent() {
        let config = DecoderConfig::default();
        let act = click_activations(20);
        let a = serde_json::to_string(&decode(&act, &config).unwrap()).unwrap();
        let b = serde_json::to_string(&decode(&act, &config).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_silent_activations() {
        let n = 1000;
        let act = Activations {
            beat: vec![0.0; n],
            downbeat: vec![0.0; n],
            boundary: vec![0.0; n],
            labels: Array2::zeros((n, 10)),
            frame_rate: 100.0,
        };
        let config = DecoderConfig::default();

        let segments = match decode(&act, &config).unwrap_err() {
            AllInOneError::NoBeatsDetected { segments, .. } => segments,
            other => panic!("unexpected error {:?}", other),
        };
        assert_eq!(segments, decode_segments(&act, &config).unwrap());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, 10.0);
        assert_eq!(segments[0].label, config.default_label);
    }

    #[test]
    fn test_unequal_curves_rejected() {
        let mut act = click_activations(10);
        act.downbeat.truncate(900);
        let err = decode(&act, &DecoderConfig::default()).unwrap_err();
        assert!(matches!(err, AllInOneError::ConfigError(_)));

        let mut act = click_activations(10);
        act.labels = Array2::zeros((999, 10));
        assert!(decode(&act, &DecoderConfig::default()).is_err());
    }

    #[test]
    fn test_min_bpm_changes_tempo() {
        // Three beats 0.5 s apart, then four 1.5 s apart
        let n = 800;
        let mut beat = vec![0.01f32; n];
        for t in [0, 50, 100, 250, 400, 550, 700] {
            beat[t] = 0.9;
        }
        let act = Activations {
            beat,
            downbeat: vec![0.0; n],
            boundary: vec![0.0; n],
            labels: Array2::from_elem((n, 10), 0.1),
            frame_rate: 100.0,
        };

        let fast = decode(&act, &DecoderConfig::default()).unwrap();
        assert!((fast.bpm.unwrap() - 120.0).abs() < 1e-6);

        let slow_config = DecoderConfig { min_bpm: 30.0, ..DecoderConfig::default() };
        let slow = decode(&act, &slow_config).unwrap();
        assert!((slow.bpm.unwrap() - 40.0).abs() < 1e-6);
        assert_eq!(slow.beats, fast.beats);
    }

    #[test]
    fn test_max_beat_distance_rounds_down() {
        // 60 / 55 * 100 = 109.09 frames
        assert_eq!(DecoderConfig::default().max_beat_distance_frames(100.0), 109);
        let exact = DecoderConfig { min_bpm: 60.0, ..DecoderConfig::default() };
        assert_eq!(exact.max_beat_distance_frames(100.0), 100);
    }

    #[test]
    fn test_min_beat_distance_rounds_up() {
        let config = DecoderConfig::default();
        // 60 / 215 * 100 = 27.9 frames
        assert_eq!(config.min_beat_distance_frames(100.0), 28);
        let exact = DecoderConfig { max_bpm: 200.0, ..DecoderConfig::default() };
        assert_eq!(exact.min_beat_distance_frames(100.0), 30);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = DecoderConfig { beat_threshold: 1.5, ..DecoderConfig::default() };
        assert!(bad.validate().is_err());
        let bad = DecoderConfig { min_bpm: 220.0, ..DecoderConfig::default() };
        assert!(bad.validate().is_err());
        assert!(DecoderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_json_uses_defaults_for_missing_fields() {
        let config: DecoderConfig =
            serde_json::from_str(r#"{"beat_threshold": 0.3, "label_aggregation": "majority"}"#).unwrap();
        assert_eq!(config.beat_threshold, 0.3);
        assert_eq!(config.label_aggregation, LabelAggregation::Majority);
        assert_eq!(config.labels.len(), 10);
    }
}
