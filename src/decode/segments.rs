//! Functional segment decoding
//!
//! Boundary candidates come from windowed peak picking on the boundary curve.
//! They are accepted strongest first while every segment stays at least
//! `min_segment_duration` long, then each interval gets one label aggregated
//! from the per-frame label distributions.

use super::peaks::windowed_peaks;
use super::{DecoderConfig, LabelAggregation};
use crate::error::{AllInOneError, Result};
use crate::types::{Activations, Segment};
use ndarray::{ArrayView2, Axis};
use tracing::debug;

/// Decode segments covering `[0, activations.duration())`
///
/// Never fails on content: with no usable boundary the whole track becomes
/// one segment. Only malformed activations or a label-count mismatch between
/// model and configuration are errors.
pub fn decode_segments(activations: &Activations, config: &DecoderConfig) -> Result<Vec<Segment>> {
    activations.validate()?;
    if activations.num_labels() != config.labels.len() {
        return Err(AllInOneError::ConfigError(format!(
            "model produces {} label classes but {} label names are configured",
            activations.num_labels(),
            config.labels.len()
        )));
    }

    let n = activations.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let boundaries = select_boundaries(activations, config);
    if boundaries.is_empty() {
        let label = fallback_label(activations.labels.view(), config);
        debug!("No segment boundaries; single '{}' segment", label);
        return Ok(vec![Segment {
            start: 0.0,
            end: activations.duration(),
            label,
        }]);
    }

    let mut edges = Vec::with_capacity(boundaries.len() + 2);
    edges.push(0);
    edges.extend(boundaries);
    edges.push(n);

    let segments: Vec<Segment> = edges
        .windows(2)
        .map(|w| {
            let frames = activations.labels.slice(ndarray::s![w[0]..w[1], ..]);
            let class = aggregate(frames, config.label_aggregation);
            Segment {
                start: activations.frame_time(w[0]),
                end: activations.frame_time(w[1]),
                label: config.labels[class].clone(),
            }
        })
        .collect();

    debug!("Decoded {} segments", segments.len());
    Ok(segments)
}

/// Accepted boundary frames in ascending order
fn select_boundaries(activations: &Activations, config: &DecoderConfig) -> Vec<usize> {
    let n = activations.len();
    let fps = activations.frame_rate;
    let window = (config.boundary_window * fps).round() as usize;
    let min_len = ((config.min_segment_duration * fps) - 1e-9).ceil().max(1.0) as usize;

    let mut candidates = windowed_peaks(&activations.boundary, window, config.boundary_threshold);
    candidates.sort_by(|a, b| b.strength.total_cmp(&a.strength).then(a.frame.cmp(&b.frame)));

    let mut accepted: Vec<usize> = Vec::new();
    for candidate in candidates {
        let frame = candidate.frame;
        let fits = frame >= min_len
            && n - frame >= min_len
            && accepted.iter().all(|&a| a.abs_diff(frame) >= min_len);
        if fits {
            accepted.push(frame);
        }
    }
    accepted.sort_unstable();
    accepted
}

/// Index of the label chosen for a block of frames
pub fn aggregate(frames: ArrayView2<'_, f32>, method: LabelAggregation) -> usize {
    match method {
        LabelAggregation::MeanArgmax => match frames.mean_axis(Axis(0)) {
            Some(mean) => argmax(mean.iter().copied()),
            None => 0,
        },
        LabelAggregation::Majority => {
            let mut votes = vec![0usize; frames.ncols()];
            for row in frames.rows() {
                votes[argmax(row.iter().copied())] += 1;
            }
            argmax(votes.into_iter().map(|v| v as f32))
        }
    }
}

/// Label for a track without boundaries
fn fallback_label(labels: ArrayView2<'_, f32>, config: &DecoderConfig) -> String {
    let Some(mean) = labels.mean_axis(Axis(0)) else {
        return config.default_label.clone();
    };
    let class = aggregate(labels, config.label_aggregation);
    if mean[class] < config.min_label_confidence {
        config.default_label.clone()
    } else {
        config.labels[class].clone()
    }
}

/// First index of the maximum (NaN never wins)
fn argmax(values: impl Iterator<Item = f32>) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
