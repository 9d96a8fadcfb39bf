//! Harmonic/percussive separation by median filtering
//!
//! Sustained partials are smooth along time, transients are smooth along
//! frequency. Median filtering in each direction gives the two estimates,
//! which become soft (Wiener-style) masks over the input magnitudes.

use ndarray::Array2;

const MASK_EPS: f32 = 1e-10;

/// Split a band spectrogram `[frames, bands]` into (harmonic, percussive)
///
/// `kernel` is the median filter length in frames (harmonic) and bands
/// (percussive). Edges use a truncated window.
pub fn separate(spectrogram: &Array2<f32>, kernel: usize) -> (Array2<f32>, Array2<f32>) {
    let (frames, bands) = spectrogram.dim();
    let half = kernel / 2;

    let mut harmonic_est = Array2::<f32>::zeros((frames, bands));
    let mut percussive_est = Array2::<f32>::zeros((frames, bands));
    let mut scratch = Vec::with_capacity(kernel);

    for b in 0..bands {
        let column = spectrogram.column(b);
        for t in 0..frames {
            let lo = t.saturating_sub(half);
            let hi = (t + half + 1).min(frames);
            scratch.clear();
            scratch.extend(column.iter().skip(lo).take(hi - lo).copied());
            harmonic_est[[t, b]] = median(&mut scratch);
        }
    }

    for t in 0..frames {
        let row = spectrogram.row(t);
        for b in 0..bands {
            let lo = b.saturating_sub(half);
            let hi = (b + half + 1).min(bands);
            scratch.clear();
            scratch.extend(row.iter().skip(lo).take(hi - lo).copied());
            percussive_est[[t, b]] = median(&mut scratch);
        }
    }

    let mut harmonic = spectrogram.clone();
    let mut percussive = spectrogram.clone();

    ndarray::Zip::from(&mut harmonic)
        .and(&mut percussive)
        .and(&harmonic_est)
        .and(&percussive_est)
        .for_each(|h, p, &he, &pe| {
            let h2 = he * he;
            let p2 = pe * pe;
            let total = h2 + p2 + MASK_EPS;
            *h *= h2 / total;
            *p *= p2 / total;
        });

    (harmonic, percussive)
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    values[values.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut []), 0.0);
    }

    #[test]
    fn test_sustained_tone_is_harmonic() {
        // One band lit for all frames
        let mut spec = Array2::<f32>::zeros((40, 20));
        spec.column_mut(7).fill(1.0);

        let (h, p) = separate(&spec, 9);
        assert!(h[[20, 7]] > 0.9);
        assert!(p[[20, 7]] < 0.1);
    }

    #[test]
    fn test_click_is_percussive() {
        // One frame lit across all bands
        let mut spec = Array2::<f32>::zeros((40, 20));
        spec.row_mut(20).fill(1.0);

        let (h, p) = separate(&spec, 9);
        assert!(p[[20, 10]] > 0.9);
        assert!(h[[20, 10]] < 0.1);
    }

    #[test]
    fn test_silence_stays_silent() {
        let spec = Array2::<f32>::zeros((10, 5));
        let (h, p) = separate(&spec, 5);
        assert!(h.iter().chain(p.iter()).all(|&v| v == 0.0));
    }
}
