//! Core data types for allin1
//!
//! These types represent the domain model and flow through the pipeline.

use crate::error::{AllInOneError, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// =============================================================================
// Audio buffers
// =============================================================================

/// Decoded PCM audio as handed over by a decoder or a stem separator
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Interleaved samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: usize,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Single-channel waveform
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Number of samples per channel
    pub fn num_frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.num_frames() == 0
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        // Guard against division by zero - use 0 duration for invalid sample rate
        if self.sample_rate > 0 {
            self.num_frames() as f64 / self.sample_rate as f64
        } else {
            0.0
        }
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }
}

/// The four stems produced by a Demucs-style separator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Bass,
    Drums,
    Other,
    Vocals,
}

impl Stem {
    pub const ALL: [Stem; 4] = [Stem::Bass, Stem::Drums, Stem::Other, Stem::Vocals];

    /// File stem used by separators when writing stems to disk
    pub fn name(self) -> &'static str {
        match self {
            Stem::Bass => "bass",
            Stem::Drums => "drums",
            Stem::Other => "other",
            Stem::Vocals => "vocals",
        }
    }
}

/// Pre-separated stems for one track
#[derive(Debug, Clone, Default)]
pub struct StemSet {
    stems: BTreeMap<Stem, Waveform>,
}

impl StemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stem: Stem, waveform: Waveform) {
        self.stems.insert(stem, waveform);
    }

    pub fn get(&self, stem: Stem) -> Option<&Waveform> {
        self.stems.get(&stem)
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

// =============================================================================
// Model outputs
// =============================================================================

/// Per-frame outputs of the four task heads
///
/// Owned by one decode call; nothing here outlives a track.
#[derive(Debug, Clone)]
pub struct Activations {
    /// Beat presence in [0, 1]
    pub beat: Vec<f32>,
    /// Downbeat presence in [0, 1]
    pub downbeat: Vec<f32>,
    /// Segment-boundary presence in [0, 1]
    pub boundary: Vec<f32>,
    /// Functional label distribution, shape [frames, labels]
    pub labels: Array2<f32>,
    /// Frames per second
    pub frame_rate: f64,
}

/// Activations of a single frame
#[derive(Debug, Clone, Copy)]
pub struct FrameActivation<'a> {
    pub beat: f32,
    pub downbeat: f32,
    pub boundary: f32,
    pub labels: ArrayView1<'a, f32>,
}

impl Activations {
    /// Number of frames
    pub fn len(&self) -> usize {
        self.beat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beat.is_empty()
    }

    /// Number of functional label classes
    pub fn num_labels(&self) -> usize {
        self.labels.ncols()
    }

    /// Track duration covered by the frames, in seconds
    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.frame_rate
    }

    /// Check that all curves cover the same frames
    pub fn validate(&self) -> Result<()> {
        let n = self.beat.len();
        let lengths = [
            ("downbeat", self.downbeat.len()),
            ("boundary", self.boundary.len()),
            ("label", self.labels.nrows()),
        ];
        for (name, len) in lengths {
            if len != n {
                return Err(AllInOneError::ConfigError(format!(
                    "{} activations cover {} frames but beat activations cover {}",
                    name, len, n
                )));
            }
        }
        if !(self.frame_rate > 0.0) {
            return Err(AllInOneError::ConfigError(format!(
                "activation frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        Ok(())
    }

    /// Timestamp of a frame index
    pub fn frame_time(&self, index: usize) -> f64 {
        index as f64 / self.frame_rate
    }

    pub fn frame(&self, index: usize) -> FrameActivation<'_> {
        FrameActivation {
            beat: self.beat[index],
            downbeat: self.downbeat[index],
            boundary: self.boundary[index],
            labels: self.labels.row(index),
        }
    }
}

// =============================================================================
// Decoded events
// =============================================================================

/// A labeled half-open interval [start, end)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub label: String,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A discrete decoded occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Beat {
        time: f64,
    },
    Downbeat {
        time: f64,
    },
    SegmentBoundary {
        time: f64,
        /// Label of the segment ending here (None at track start)
        label: Option<String>,
        /// Label of the segment starting here (None at track end)
        next_label: Option<String>,
    },
}

impl Event {
    pub fn time(&self) -> f64 {
        match self {
            Event::Beat { time } | Event::Downbeat { time } => *time,
            Event::SegmentBoundary { time, .. } => *time,
        }
    }

    /// Ordering among events sharing a timestamp: boundaries, downbeats, beats
    fn rank(&self) -> u8 {
        match self {
            Event::SegmentBoundary { .. } => 0,
            Event::Downbeat { .. } => 1,
            Event::Beat { .. } => 2,
        }
    }
}

/// Complete analysis result for a single track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackAnalysis {
    /// Source file path (empty for in-memory input)
    #[serde(default)]
    pub path: PathBuf,
    /// Duration covered by the analysis, in seconds
    #[serde(default)]
    pub duration: f64,
    /// Tempo from the median inter-beat interval
    #[serde(default)]
    pub bpm: Option<f64>,
    /// Beat timestamps in seconds, ascending
    pub beats: Vec<f64>,
    /// Downbeat timestamps in seconds, ascending, subset of `beats`
    pub downbeats: Vec<f64>,
    /// 1-based position of each beat within its bar
    #[serde(default)]
    pub beat_positions: Vec<u32>,
    /// Functional segments covering [0, duration)
    pub segments: Vec<Segment>,
}

impl TrackAnalysis {
    /// All events merged into one time-ordered list
    pub fn events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = Vec::with_capacity(
            self.beats.len() + self.downbeats.len() + self.segments.len() + 1,
        );

        events.extend(self.beats.iter().map(|&time| Event::Beat { time }));
        events.extend(self.downbeats.iter().map(|&time| Event::Downbeat { time }));

        let mut previous: Option<&Segment> = None;
        for segment in &self.segments {
            events.push(Event::SegmentBoundary {
                time: segment.start,
                label: previous.map(|s| s.label.clone()),
                next_label: Some(segment.label.clone()),
            });
            previous = Some(segment);
        }
        if let Some(last) = previous {
            events.push(Event::SegmentBoundary {
                time: last.end,
                label: Some(last.label.clone()),
                next_label: None,
            });
        }

        events.sort_by(|a, b| a.time().total_cmp(&b.time()).then(a.rank().cmp(&b.rank())));
        events
    }
}

// =============================================================================
// Supported formats
// =============================================================================

/// Audio formats accepted by the file decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Flac,
    Aiff,
    Ogg,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "aiff" | "aif" => Some(AudioFormat::Aiff),
            "ogg" => Some(AudioFormat::Ogg),
            _ => None,
        }
    }

    /// Check if a path has a supported extension
    pub fn is_supported_path(path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_to_mono() {
        let stereo = Waveform::new(vec![0.5, 0.3, 0.8, 0.2, 1.0, 0.0], 44100, 2);
        let mono = stereo.to_mono();
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.4).abs() < 0.001);
        assert!((mono[1] - 0.5).abs() < 0.001);
        assert!((mono[2] - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_waveform_duration_zero_rate() {
        let w = Waveform::new(vec![0.0; 100], 0, 1);
        assert_eq!(w.duration(), 0.0);
    }

    #[test]
    fn test_events_are_time_ordered() {
        let analysis = TrackAnalysis {
            path: PathBuf::new(),
            duration: 4.0,
            bpm: Some(120.0),
            beats: vec![0.0, 0.5, 1.0, 1.5, 2.0],
            downbeats: vec![0.0, 2.0],
            beat_positions: vec![1, 2, 3, 4, 1],
            segments: vec![
                Segment { start: 0.0, end: 2.0, label: "intro".into() },
                Segment { start: 2.0, end: 4.0, label: "verse".into() },
            ],
        };

        let events = analysis.events();
        assert_eq!(events.len(), 5 + 2 + 3);
        assert!(events.windows(2).all(|w| w[0].time() <= w[1].time()));
        assert_eq!(
            events[0],
            Event::SegmentBoundary { time: 0.0, label: None, next_label: Some("intro".into()) }
        );
        assert_eq!(events[1], Event::Downbeat { time: 0.0 });
        assert_eq!(events[2], Event::Beat { time: 0.0 });
        assert_eq!(
            events.last(),
            Some(&Event::SegmentBoundary { time: 4.0, label: Some("verse".into()), next_label: None })
        );
    }

    #[test]
    fn test_activations_with_unequal_curves_rejected() {
        let act = Activations {
            beat: vec![0.0; 10],
            downbeat: vec![0.0; 10],
            boundary: vec![0.0; 9],
            labels: Array2::zeros((10, 2)),
            frame_rate: 100.0,
        };
        let err = act.validate().unwrap_err();
        assert!(err.to_string().contains("boundary activations cover 9 frames"));

        let act = Activations { boundary: vec![0.0; 10], ..act };
        assert!(act.validate().is_ok());
        let act = Activations { labels: Array2::zeros((11, 2)), ..act };
        assert!(act.validate().is_err());
    }

    #[test]
    fn test_audio_format_from_extension() {
        assert_eq!(AudioFormat::from_extension("WAV"), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::from_extension("aif"), Some(AudioFormat::Aiff));
        assert_eq!(AudioFormat::from_extension("txt"), None);
    }
}
