//! Beat and downbeat decoding
//!
//! Works in frame indices throughout; conversion to seconds happens once the
//! event lists are final, so downbeat timestamps are bit-identical to the beat
//! timestamps they were snapped to.

use super::peaks::{local_maxima, suppress_close};
use super::DecoderConfig;
use crate::error::{AllInOneError, Result};
use crate::types::Activations;
use std::collections::BTreeMap;
use tracing::debug;

/// Beats per bar assumed when no bar can be observed
pub const FALLBACK_BAR_LENGTH: usize = 4;

/// Beat frames: thresholded local maxima, thinned to the maximum tempo
pub fn decode_beat_frames(activations: &Activations, config: &DecoderConfig) -> Result<Vec<usize>> {
    let curve = &activations.beat;
    let candidates = local_maxima(curve, config.beat_threshold);
    if candidates.is_empty() {
        let peak = curve.iter().copied().fold(0.0f32, f32::max);
        return Err(AllInOneError::NoBeatsDetected {
            peak,
            threshold: config.beat_threshold,
            segments: Vec::new(),
        });
    }

    let min_distance = config.min_beat_distance_frames(activations.frame_rate);
    let beats = suppress_close(curve, &candidates, min_distance);
    debug!(
        "Beat decoding: {} candidates, {} kept (min distance {} frames)",
        candidates.len(),
        beats.len(),
        min_distance
    );
    Ok(beats)
}

/// Downbeat frames, each one of `beats`
pub fn decode_downbeat_frames(
    activations: &Activations,
    beats: &[usize],
    config: &DecoderConfig,
) -> Vec<usize> {
    if beats.is_empty() {
        return Vec::new();
    }

    let curve = &activations.downbeat;
    let tolerance = (config.snap_tolerance * activations.frame_rate).round() as usize;
    let strength = |frame: usize| -> f32 {
        let lo = frame.saturating_sub(tolerance);
        let hi = (frame + tolerance + 1).min(curve.len());
        curve[lo..hi].iter().copied().fold(0.0f32, f32::max)
    };

    // Snap peaks to beats; several peaks landing on one beat collapse to one
    let peaks = local_maxima(curve, config.downbeat_threshold);
    let mut snapped: BTreeMap<usize, f32> = BTreeMap::new();
    for peak in peaks {
        if let Some(k) = nearest_beat(beats, peak) {
            if beats[k].abs_diff(peak) <= tolerance {
                let entry = snapped.entry(k).or_insert(0.0);
                *entry = entry.max(curve[peak]);
            }
        }
    }

    // A downbeat outweighs the beats on either side of it
    let beat_strength: Vec<f32> = beats.iter().map(|&b| strength(b)).collect();
    let candidates: Vec<(usize, f32)> = snapped
        .into_iter()
        .filter(|&(k, _)| {
            let s = beat_strength[k];
            (k == 0 || s >= beat_strength[k - 1]) && (k + 1 == beats.len() || s >= beat_strength[k + 1])
        })
        .collect();

    let max_ibi = config.max_beat_distance_frames(activations.frame_rate);
    let kept = enforce_meter(&candidates, beats, config.meter_tolerance, max_ibi);
    debug!(
        "Downbeat decoding: {} snapped candidates, {} kept",
        candidates.len(),
        kept.len()
    );
    kept.into_iter().map(|k| beats[k]).collect()
}

/// Index into `beats` of the beat closest to `frame` (earlier beat on ties)
fn nearest_beat(beats: &[usize], frame: usize) -> Option<usize> {
    if beats.is_empty() {
        return None;
    }
    let after = beats.partition_point(|&b| b < frame);
    if after == 0 {
        return Some(0);
    }
    if after == beats.len() {
        return Some(beats.len() - 1);
    }
    let before = after - 1;
    if frame - beats[before] <= beats[after] - frame {
        Some(before)
    } else {
        Some(after)
    }
}

/// Most common gap, in beats, between consecutive entries (smaller gap wins ties)
pub fn dominant_bar_length(beat_indices: &[usize]) -> Option<usize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for pair in beat_indices.windows(2) {
        let gap = pair[1] - pair[0];
        if gap > 0 {
            *counts.entry(gap).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(usize, usize)>, (gap, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((gap, count)),
        })
        .map(|(gap, _)| gap)
}

/// Median inter-beat interval (in frames) around beat `k`
///
/// Gaps wider than `max_ibi` are pauses rather than beat periods and are
/// ignored; with no usable gap nearby the interval is `max_ibi`.
fn local_ibi(beats: &[usize], k: usize, max_ibi: usize) -> f64 {
    const SPAN: usize = 4;
    let lo = k.saturating_sub(SPAN);
    let hi = (k + SPAN).min(beats.len() - 1);
    let mut gaps: Vec<f64> = beats[lo..=hi]
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&gap| gap <= max_ibi)
        .map(|gap| gap as f64)
        .collect();
    median(&mut gaps).unwrap_or(max_ibi as f64)
}

/// Keep downbeat candidates that are spaced by whole bars
///
/// `candidates` holds (beat index, strength) in ascending beat order.
fn enforce_meter(
    candidates: &[(usize, f32)],
    beats: &[usize],
    meter_tolerance: f64,
    max_ibi: usize,
) -> Vec<usize> {
    if candidates.len() <= 1 {
        return candidates.iter().map(|&(k, _)| k).collect();
    }

    let indices: Vec<usize> = candidates.iter().map(|&(k, _)| k).collect();
    let bar = dominant_bar_length(&indices).unwrap_or(FALLBACK_BAR_LENGTH) as f64;

    let fits = |from: usize, to: usize| -> (bool, bool) {
        let ibi = local_ibi(beats, from, max_ibi);
        let expected = bar * ibi;
        let tolerance = meter_tolerance * ibi;
        let delta = (beats[to] - beats[from]) as f64;
        let bars = (delta / expected).round();
        let on_grid = bars >= 1.0 && (delta - bars * expected).abs() <= tolerance;
        let early = delta < expected - tolerance;
        (on_grid, early)
    };

    let mut kept: Vec<(usize, f32)> = vec![candidates[0]];
    for &(k, s) in &candidates[1..] {
        let Some(&(last, last_strength)) = kept.last() else {
            kept.push((k, s));
            continue;
        };
        let (on_grid, early) = fits(last, k);
        if on_grid {
            kept.push((k, s));
        } else if early && s > last_strength {
            let consistent = kept.len() < 2 || fits(kept[kept.len() - 2].0, k).0;
            if consistent {
                kept.pop();
                kept.push((k, s));
            }
        }
    }

    kept.into_iter().map(|(k, _)| k).collect()
}

pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Tempo from the median inter-beat interval
///
/// Intervals slower than `min_bpm` are pauses and do not count; `None` when no
/// interval is left.
pub fn estimate_bpm(beat_times: &[f64], min_bpm: f64) -> Option<f64> {
    let max_interval = 60.0 / min_bpm + 1e-9;
    let mut intervals: Vec<f64> = beat_times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&ibi| ibi <= max_interval)
        .collect();
    median(&mut intervals)
        .filter(|&ibi| ibi > 0.0)
        .map(|ibi| 60.0 / ibi)
}

/// 1-based position of every beat within its bar
///
/// Counted from the most recent downbeat; beats before the first downbeat are
/// counted backwards from it. Without downbeats, the first beat starts a bar.
pub fn beat_positions(beats: &[usize], downbeats: &[usize]) -> Vec<u32> {
    let down_indices: Vec<usize> = downbeats
        .iter()
        .filter_map(|d| beats.binary_search(d).ok())
        .collect();
    let bar = dominant_bar_length(&down_indices).unwrap_or(FALLBACK_BAR_LENGTH) as i64;

    (0..beats.len())
        .map(|k| {
            let reference = match down_indices.partition_point(|&d| d <= k) {
                0 => down_indices.first().copied().unwrap_or(0),
                n => down_indices[n - 1],
            };
            ((k as i64 - reference as i64).rem_euclid(bar) + 1) as u32
        })
        .collect()
}
