//! Logarithmically spaced triangular filterbank
//!
//! Center frequencies follow `fmin * 2^(k / bands_per_octave)` up to `fmax`.
//! Each frequency is snapped to its nearest FFT bin and duplicates are merged,
//! so the low end (where bins are wider than semitones) gets fewer bands.
//! Every filter is normalized to unit area.

use ndarray::{Array2, ArrayView2};

/// One triangular filter stored sparsely
#[derive(Debug, Clone)]
struct Filter {
    start_bin: usize,
    weights: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct LogFilterbank {
    filters: Vec<Filter>,
    num_bins: usize,
}

impl LogFilterbank {
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        bands_per_octave: usize,
        fmin: f64,
        fmax: f64,
    ) -> Self {
        let num_bins = window_size / 2 + 1;
        let bin_hz = sample_rate as f64 / window_size as f64;
        let nyquist = sample_rate as f64 / 2.0;
        let fmax = fmax.min(nyquist);

        let mut bins: Vec<usize> = Vec::new();
        let mut k = 0usize;
        loop {
            let freq = fmin * 2f64.powf(k as f64 / bands_per_octave as f64);
            if freq > fmax {
                break;
            }
            let bin = ((freq / bin_hz).round() as usize).min(num_bins - 1);
            if bins.last() != Some(&bin) {
                bins.push(bin);
            }
            k += 1;
        }

        let filters = bins
            .windows(3)
            .map(|w| triangle(w[0], w[1], w[2]))
            .collect();

        Self { filters, num_bins }
    }

    /// Number of output bands
    pub fn num_bands(&self) -> usize {
        self.filters.len()
    }

    /// Apply to a magnitude spectrogram `[frames, bins]` → `[frames, bands]`
    pub fn apply(&self, spectrogram: ArrayView2<'_, f32>) -> Array2<f32> {
        debug_assert_eq!(spectrogram.ncols(), self.num_bins);
        let mut out = Array2::<f32>::zeros((spectrogram.nrows(), self.filters.len()));

        for (row, mut out_row) in spectrogram.outer_iter().zip(out.outer_iter_mut()) {
            for (band, filter) in self.filters.iter().enumerate() {
                out_row[band] = filter
                    .weights
                    .iter()
                    .enumerate()
                    .map(|(i, w)| w * row[filter.start_bin + i])
                    .sum();
            }
        }

        out
    }
}

fn triangle(start: usize, center: usize, stop: usize) -> Filter {
    let mut weights = Vec::with_capacity(stop - start + 1);
    for bin in start..=stop {
        let w = if bin < center {
            (bin - start) as f32 / (center - start) as f32
        } else if bin == center {
            1.0
        } else {
            (stop - bin) as f32 / (stop - center) as f32
        };
        weights.push(w);
    }

    let area: f32 = weights.iter().sum();
    if area > 0.0 {
        weights.iter_mut().for_each(|w| *w /= area);
    }

    Filter {
        start_bin: start,
        weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_band_count() {
        let fb = LogFilterbank::new(44100, 2048, 12, 30.0, 17000.0);
        // Merged semitone bins between 30 Hz and 17 kHz
        assert!(fb.num_bands() > 70 && fb.num_bands() < 100, "got {}", fb.num_bands());
    }

    #[test]
    fn test_filters_have_unit_area() {
        let fb = LogFilterbank::new(44100, 2048, 12, 30.0, 17000.0);
        for f in &fb.filters {
            let area: f32 = f.weights.iter().sum();
            assert!((area - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_flat_spectrum_maps_to_ones() {
        let fb = LogFilterbank::new(44100, 2048, 12, 30.0, 17000.0);
        let spec = Array2::<f32>::ones((3, 1025));
        let bands = fb.apply(spec.view());
        assert_eq!(bands.dim(), (3, fb.num_bands()));
        assert!(bands.iter().all(|&v| (v - 1.0).abs() < 1e-4));
    }
}
