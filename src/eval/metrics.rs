//! Individual evaluation metrics

use crate::types::Segment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Slack for floating-point timestamps sitting exactly on a window edge
const TIME_EPS: f64 = 1e-9;

/// Precision, recall and their harmonic mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
}

impl Score {
    pub fn perfect() -> Self {
        Self::new(1.0, 1.0)
    }

    pub fn new(precision: f64, recall: f64) -> Self {
        let f_measure = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f_measure,
        }
    }

    /// Score from matched, reference and estimated counts
    ///
    /// Two empty sets agree perfectly.
    pub fn from_counts(hits: usize, num_reference: usize, num_estimate: usize) -> Self {
        if num_reference == 0 && num_estimate == 0 {
            return Self::perfect();
        }
        let ratio = |n: usize| if n == 0 { 0.0 } else { hits as f64 / n as f64 };
        Self::new(ratio(num_estimate), ratio(num_reference))
    }

    pub fn mean(scores: impl Iterator<Item = Score>) -> Self {
        let (mut p, mut r, mut f, mut n) = (0.0, 0.0, 0.0, 0usize);
        for s in scores {
            p += s.precision;
            r += s.recall;
            f += s.f_measure;
            n += 1;
        }
        if n == 0 {
            return Self::perfect();
        }
        let n = n as f64;
        Self {
            precision: p / n,
            recall: r / n,
            f_measure: f / n,
        }
    }
}

/// Size of a one-to-one matching between two sorted time lists
///
/// Two events match when they lie within `tolerance` seconds. Greedy
/// left-to-right matching is maximal for a shared symmetric window.
pub fn match_events(reference: &[f64], estimate: &[f64], tolerance: f64) -> usize {
    let (mut i, mut j, mut hits) = (0, 0, 0);
    while i < reference.len() && j < estimate.len() {
        let (r, e) = (reference[i], estimate[j]);
        if (r - e).abs() <= tolerance + TIME_EPS {
            hits += 1;
            i += 1;
            j += 1;
        } else if e < r {
            j += 1;
        } else {
            i += 1;
        }
    }
    hits
}

/// F-measure of event onsets (beats, downbeats)
pub fn event_f_measure(reference: &[f64], estimate: &[f64], tolerance: f64) -> Score {
    let hits = match_events(reference, estimate, tolerance);
    Score::from_counts(hits, reference.len(), estimate.len())
}

/// Interior boundary times: every segment start except the first
fn interior_boundaries(segments: &[Segment]) -> Vec<f64> {
    segments.iter().skip(1).map(|s| s.start).collect()
}

/// Boundary hit rate within `window` seconds, ignoring track start and end
pub fn boundary_detection(reference: &[Segment], estimate: &[Segment], window: f64) -> Score {
    event_f_measure(&interior_boundaries(reference), &interior_boundaries(estimate), window)
}

fn label_at(segments: &[Segment], time: f64) -> Option<&str> {
    segments
        .iter()
        .find(|s| s.start <= time && time < s.end)
        .map(|s| s.label.as_str())
}

fn pairs(n: u64) -> u64 {
    n * n.saturating_sub(1) / 2
}

/// Pairwise frame-clustering precision/recall
///
/// Both annotations are sampled at the centers of `frame_size`-second frames
/// over the reference duration. A pair of samples agrees when both
/// annotations give the two samples the same label.
pub fn pairwise_clustering(reference: &[Segment], estimate: &[Segment], frame_size: f64) -> Score {
    let duration = reference
        .last()
        .or(estimate.last())
        .map(|s| s.end)
        .unwrap_or(0.0);
    let num_samples = (duration / frame_size - TIME_EPS).ceil().max(0.0) as usize;
    if num_samples < 2 {
        return Score::perfect();
    }

    let mut ref_counts: HashMap<Option<&str>, u64> = HashMap::new();
    let mut est_counts: HashMap<Option<&str>, u64> = HashMap::new();
    let mut joint_counts: HashMap<(Option<&str>, Option<&str>), u64> = HashMap::new();
    for k in 0..num_samples {
        let t = (k as f64 + 0.5) * frame_size;
        let r = label_at(reference, t);
        let e = label_at(estimate, t);
        *ref_counts.entry(r).or_insert(0) += 1;
        *est_counts.entry(e).or_insert(0) += 1;
        *joint_counts.entry((r, e)).or_insert(0) += 1;
    }

    let ref_pairs: u64 = ref_counts.values().map(|&n| pairs(n)).sum();
    let est_pairs: u64 = est_counts.values().map(|&n| pairs(n)).sum();
    let joint_pairs: u64 = joint_counts.values().map(|&n| pairs(n)).sum();

    let ratio = |den: u64| if den == 0 { 1.0 } else { joint_pairs as f64 / den as f64 };
    Score::new(ratio(est_pairs), ratio(ref_pairs))
}

/// Fraction of reference time where the estimate carries the same label
pub fn label_accuracy(reference: &[Segment], estimate: &[Segment]) -> f64 {
    let total: f64 = reference.iter().map(|s| s.duration().max(0.0)).sum();
    if total <= 0.0 {
        return 1.0;
    }

    let mut correct = 0.0;
    for r in reference {
        for e in estimate.iter().filter(|e| e.label == r.label) {
            let overlap = r.end.min(e.end) - r.start.max(e.start);
            if overlap > 0.0 {
                correct += overlap;
            }
        }
    }
    correct / total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, label: &str) -> Segment {
        Segment {
            start,
            end,
            label: label.to_string(),
        }
    }

    #[test]
    fn test_match_events_one_to_one() {
        // Two estimates near one reference only match once
        assert_eq!(match_events(&[1.0], &[0.97, 1.03], 0.07), 1);
        assert_eq!(match_events(&[1.0, 2.0], &[1.05, 2.08], 0.07), 1);
        assert_eq!(match_events(&[], &[1.0], 0.07), 0);
    }

    #[test]
    fn test_event_f_measure() {
        let s = event_f_measure(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0], 0.07);
        assert_eq!(s.precision, 1.0);
        assert_eq!(s.recall, 0.5);
        assert!((s.f_measure - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_sets() {
        assert_eq!(event_f_measure(&[], &[], 0.07), Score::perfect());
        assert_eq!(event_f_measure(&[1.0], &[], 0.07).f_measure, 0.0);
        assert_eq!(event_f_measure(&[], &[1.0], 0.07).f_measure, 0.0);
    }

    #[test]
    fn test_boundary_windows() {
        let reference = vec![seg(0.0, 10.0, "a"), seg(10.0, 20.0, "b")];
        let estimate = vec![seg(0.0, 12.0, "a"), seg(12.0, 20.0, "b")];
        assert_eq!(boundary_detection(&reference, &estimate, 0.5).f_measure, 0.0);
        assert_eq!(boundary_detection(&reference, &estimate, 3.0).f_measure, 1.0);
    }

    #[test]
    fn test_single_segment_boundaries_agree() {
        // No interior boundaries on either side
        let a = vec![seg(0.0, 10.0, "a")];
        let b = vec![seg(0.0, 10.0, "b")];
        assert_eq!(boundary_detection(&a, &b, 0.5), Score::perfect());
    }

    #[test]
    fn test_pairwise_ignores_label_names() {
        let reference = vec![seg(0.0, 5.0, "verse"), seg(5.0, 10.0, "chorus")];
        let estimate = vec![seg(0.0, 5.0, "A"), seg(5.0, 10.0, "B")];
        assert_eq!(pairwise_clustering(&reference, &estimate, 0.1), Score::perfect());
    }

    #[test]
    fn test_pairwise_merged_estimate_loses_precision() {
        let reference = vec![seg(0.0, 5.0, "verse"), seg(5.0, 10.0, "chorus")];
        let estimate = vec![seg(0.0, 10.0, "A")];
        let s = pairwise_clustering(&reference, &estimate, 0.1);
        assert_eq!(s.recall, 1.0);
        // 2 * C(50, 2) agreeing pairs out of C(100, 2)
        assert!((s.precision - 2450.0 / 4950.0).abs() < 1e-12);
    }

    #[test]
    fn test_label_accuracy_weights_by_duration() {
        let reference = vec![seg(0.0, 6.0, "verse"), seg(6.0, 10.0, "chorus")];
        let estimate = vec![seg(0.0, 4.0, "verse"), seg(4.0, 10.0, "chorus")];
        assert!((label_accuracy(&reference, &estimate) - 0.8).abs() < 1e-12);
        assert_eq!(label_accuracy(&[], &estimate), 1.0);
    }
}
