//! Magnitude STFT with centered frames
//!
//! Frame `i` is centered on sample `i * hop`. Samples outside the signal are
//! zero, so the first and last frames see half a window of silence.

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};

/// Compute the magnitude spectrogram of a mono signal
///
/// Returns shape `[num_frames, window_size / 2 + 1]`. `num_frames` is given by
/// the caller so that every source of a track shares the same frame grid.
pub fn magnitude_spectrogram(
    samples: &[f32],
    window_size: usize,
    hop: usize,
    num_frames: usize,
) -> Array2<f32> {
    let num_bins = window_size / 2 + 1;
    let mut spectrogram = Array2::<f32>::zeros((num_frames, num_bins));
    if num_frames == 0 || window_size == 0 {
        return spectrogram;
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(window_size);
    let window = hann_window(window_size);
    let half = window_size / 2;

    let mut buffer = vec![Complex::new(0.0f32, 0.0); window_size];

    for (frame_idx, mut row) in spectrogram.outer_iter_mut().enumerate() {
        let center = frame_idx * hop;

        for (i, (slot, &w)) in buffer.iter_mut().zip(window.iter()).enumerate() {
            let pos = (center + i).checked_sub(half);
            let sample = pos.and_then(|p| samples.get(p)).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * w, 0.0);
        }

        fft.process(&mut buffer);

        for (out, c) in row.iter_mut().zip(buffer.iter()) {
            *out = c.norm();
        }
    }

    spectrogram
}

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}
