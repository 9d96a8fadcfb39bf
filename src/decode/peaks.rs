//! Peak picking primitives over activation curves

/// Frames that are local maxima at or above `threshold`
///
/// A frame qualifies when it exceeds its left neighbor and is not exceeded by
/// its right neighbor, so a flat plateau reports its first frame. Frames
/// outside the curve count as negative infinity.
pub fn local_maxima(curve: &[f32], threshold: f32) -> Vec<usize> {
    let n = curve.len();
    (0..n)
        .filter(|&i| {
            let v = curve[i];
            v >= threshold
                && (i == 0 || v > curve[i - 1])
                && (i + 1 == n || v >= curve[i + 1])
        })
        .collect()
}

/// Greedy non-maximum suppression
///
/// Visits candidates strongest first (earlier frame wins ties) and keeps a
/// candidate only if no kept frame lies closer than `min_distance` frames.
/// Returns kept frames in ascending order.
pub fn suppress_close(curve: &[f32], candidates: &[usize], min_distance: usize) -> Vec<usize> {
    let mut order = candidates.to_vec();
    order.sort_by(|&a, &b| curve[b].total_cmp(&curve[a]).then(a.cmp(&b)));

    let mut kept: Vec<usize> = Vec::with_capacity(order.len());
    for candidate in order {
        let clear = kept.iter().all(|&k| k.abs_diff(candidate) >= min_distance);
        if clear {
            kept.push(candidate);
        }
    }
    kept.sort_unstable();
    kept
}

/// A boundary candidate and its prominence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowedPeak {
    pub frame: usize,
    /// Activation minus the average of the past and future window means
    pub strength: f32,
}

/// Peaks that dominate a `±window` neighborhood and stand out from it
///
/// A frame qualifies when it is the maximum of `[i - window, i + window]`, is
/// at or above `threshold`, and has positive strength. Frames outside the
/// curve count as zero in the window means.
pub fn windowed_peaks(curve: &[f32], window: usize, threshold: f32) -> Vec<WindowedPeak> {
    let n = curve.len();
    let window = window.max(1);

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0f64);
    for &v in curve {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v as f64);
    }
    let range_sum = |lo: usize, hi: usize| prefix[hi] - prefix[lo];

    let mut peaks = Vec::new();
    for i in 0..n {
        let v = curve[i];
        if v < threshold || v <= 0.0 {
            continue;
        }
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(n);
        if curve[lo..hi].iter().any(|&other| other > v) {
            continue;
        }

        let past_mean = range_sum(lo, i) / window as f64;
        let future_mean = range_sum(i + 1, hi) / window as f64;
        let strength = v - ((past_mean + future_mean) / 2.0) as f32;
        if strength > 0.0 {
            peaks.push(WindowedPeak { frame: i, strength });
        }
    }
    peaks
}
