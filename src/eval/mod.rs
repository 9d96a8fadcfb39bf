//! Evaluation against reference annotations
//!
//! Standard MIR scores: event F-measure for beats and downbeats, boundary hit
//! rate at two tolerance windows, pairwise frame clustering and
//! duration-weighted label accuracy. Comparing an analysis with itself scores
//! 1.0 everywhere.

pub mod metrics;
pub mod report;

pub use metrics::{boundary_detection, event_f_measure, label_accuracy, pairwise_clustering, Score};
pub use report::{evaluate_paths, EvaluationReport};

use crate::error::{AllInOneError, Result};
use crate::types::TrackAnalysis;
use serde::{Deserialize, Serialize};

/// Tolerances used by `evaluate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Beat and downbeat matching window, seconds either side
    pub event_tolerance: f64,
    /// Narrow boundary window, seconds either side
    pub boundary_window_narrow: f64,
    /// Wide boundary window, seconds either side
    pub boundary_window_wide: f64,
    /// Sampling step for pairwise clustering, seconds
    pub frame_size: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            event_tolerance: 0.07,
            boundary_window_narrow: 0.5,
            boundary_window_wide: 3.0,
            frame_size: 0.1,
        }
    }
}

impl EvalConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.frame_size > 0.0) {
            return Err(AllInOneError::ConfigError(format!(
                "frame_size must be positive, got {}",
                self.frame_size
            )));
        }
        if self.event_tolerance < 0.0 || self.boundary_window_narrow < 0.0 || self.boundary_window_wide < 0.0 {
            return Err(AllInOneError::ConfigError(
                "evaluation windows must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// All scores of one estimate against one reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub beats: Score,
    pub downbeats: Score,
    /// Boundary hit rate at the narrow window (0.5 s)
    pub boundaries_narrow: Score,
    /// Boundary hit rate at the wide window (3.0 s)
    pub boundaries_wide: Score,
    pub pairwise: Score,
    pub label_accuracy: f64,
}

impl Evaluation {
    /// Unweighted mean over several tracks
    pub fn mean(evaluations: &[Evaluation]) -> Option<Evaluation> {
        if evaluations.is_empty() {
            return None;
        }
        let avg = |f: fn(&Evaluation) -> Score| Score::mean(evaluations.iter().map(f));
        Some(Evaluation {
            beats: avg(|e| e.beats),
            downbeats: avg(|e| e.downbeats),
            boundaries_narrow: avg(|e| e.boundaries_narrow),
            boundaries_wide: avg(|e| e.boundaries_wide),
            pairwise: avg(|e| e.pairwise),
            label_accuracy: evaluations.iter().map(|e| e.label_accuracy).sum::<f64>()
                / evaluations.len() as f64,
        })
    }
}

/// Score `estimate` against `reference`
pub fn evaluate(estimate: &TrackAnalysis, reference: &TrackAnalysis, config: &EvalConfig) -> Evaluation {
    Evaluation {
        beats: event_f_measure(&reference.beats, &estimate.beats, config.event_tolerance),
        downbeats: event_f_measure(&reference.downbeats, &estimate.downbeats, config.event_tolerance),
        boundaries_narrow: boundary_detection(
            &reference.segments,
            &estimate.segments,
            config.boundary_window_narrow,
        ),
        boundaries_wide: boundary_detection(
            &reference.segments,
            &estimate.segments,
            config.boundary_window_wide,
        ),
        pairwise: pairwise_clustering(&reference.segments, &estimate.segments, config.frame_size),
        label_accuracy: label_accuracy(&reference.segments, &estimate.segments),
    }
}
