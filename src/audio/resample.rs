//! Sample rate conversion
//!
//! Uses rubato's FFT resampler with a linear-interpolation fallback for the
//! rare cases where rubato refuses a ratio.

use rubato::{FftFixedInOut, Resampler};
use tracing::debug;

/// Rubato processes fixed-size chunks
const CHUNK_SIZE: usize = 1024;

/// Resample a single channel from `from_rate` to `to_rate`
///
/// Output length is `round(len * to_rate / from_rate)` and output sample `j`
/// lines up with input time `j / to_rate`: the filter delay is discarded and
/// the tail is flushed with silence.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let mut resampler = match FftFixedInOut::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        1,
    ) {
        Ok(r) => r,
        Err(e) => {
            debug!("Rubato initialization failed ({}), using fallback", e);
            return resample_linear(samples, from_rate, to_rate);
        }
    };

    let input_frames_per_chunk = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let expected_len = output_len(samples.len(), from_rate, to_rate);
    let mut output = Vec::with_capacity(delay + expected_len + resampler.output_frames_next());

    // Keep feeding (zeros past the end) until the delayed signal is complete
    let mut pos = 0;
    while output.len() < delay + expected_len {
        let mut chunk = vec![0.0f32; input_frames_per_chunk];
        if pos < samples.len() {
            let end = (pos + input_frames_per_chunk).min(samples.len());
            chunk[..end - pos].copy_from_slice(&samples[pos..end]);
        }

        match resampler.process(&[chunk], None) {
            Ok(resampled) => match resampled.into_iter().next() {
                Some(channel) if !channel.is_empty() => output.extend(channel),
                _ => break,
            },
            Err(e) => {
                debug!("Rubato processing error ({}), using fallback", e);
                return resample_linear(samples, from_rate, to_rate);
            }
        }

        pos += input_frames_per_chunk;
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected_len, 0.0);
    output
}

fn output_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    (input_len as f64 * to_rate as f64 / from_rate as f64).round() as usize
}

/// Linear interpolation resampler
///
/// May alias when downsampling; only used when rubato fails.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;

    (0..output_len(samples.len(), from_rate, to_rate))
        .map(|i| {
            let src_pos = i as f64 * ratio;
            let src_idx = src_pos as usize;
            let frac = (src_pos - src_idx as f64) as f32;

            if src_idx + 1 < samples.len() {
                samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
            } else {
                samples[src_idx.min(samples.len() - 1)]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1, 0.2, 0.3, 0.4, 0.5];
        assert_eq!(resample(&samples, 44100, 44100), samples);
    }

    #[test]
    fn test_resample_upsample_length() {
        let samples: Vec<f32> = (0..22050).map(|i| (i as f32 / 100.0).sin()).collect();
        let result = resample(&samples, 22050, 44100);
        assert_eq!(result.len(), 44100);
    }

    #[test]
    fn test_resample_keeps_impulse_in_place() {
        // 0.5 s into a 3 s signal
        let mut samples = vec![0.0f32; 144_000];
        samples[24_000] = 1.0;

        let result = resample(&samples, 48000, 44100);
        assert_eq!(result.len(), 132_300);

        let peak = result
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!(peak.abs_diff(22_050) <= 2, "impulse landed at {}", peak);
    }

    #[test]
    fn test_resample_keeps_tail() {
        // Energy in the last 10 ms must survive the flush
        let mut samples = vec![0.0f32; 48_000];
        samples[47_800] = 1.0;

        let result = resample(&samples, 48000, 44100);
        assert_eq!(result.len(), 44_100);
        let tail_peak = result[43_900..].iter().cloned().fold(0.0f32, f32::max);
        assert!(tail_peak > 0.3, "tail peak {}", tail_peak);
    }

    #[test]
    fn test_resample_preserves_sine_amplitude() {
        use std::f32::consts::PI;
        let samples: Vec<f32> = (0..4800)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 48000.0).sin())
            .collect();

        let result = resample(&samples, 48000, 44100);

        let max_val = result.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(max_val > 0.9, "Max value {} should be > 0.9", max_val);
    }

    #[test]
    fn test_linear_fallback_length() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let result = resample_linear(&samples, 44100, 22050);
        assert_eq!(result.len(), 50);
    }
}
