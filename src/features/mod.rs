//! Frame-level feature extraction
//!
//! Turns a waveform (plus optional stems) into a fixed-rate sequence of
//! log-compressed, log-frequency band magnitudes. Each configured source
//! contributes one block of bands; blocks are concatenated per frame in
//! configuration order.
//!
//! # Defaults
//!
//! 44.1 kHz, 2048-sample Hann window, hop 441 (100 frames per second),
//! 12 bands per octave between 30 Hz and 17 kHz, sources
//! `bass, drums, other, vocals`.

pub mod filterbank;
pub mod hpss;
pub mod stft;

use crate::audio::resample;
use crate::error::{AllInOneError, Result};
use crate::types::{Stem, StemSet, Waveform};
use filterbank::LogFilterbank;
use ndarray::{concatenate, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a block of feature bands comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// The full mixture
    Mix,
    /// Sustained content of the mixture (median filter along time)
    Harmonic,
    /// Transient content of the mixture (median filter along frequency)
    Percussive,
    Bass,
    Drums,
    Other,
    Vocals,
}

impl Source {
    fn stem(self) -> Option<Stem> {
        match self {
            Source::Bass => Some(Stem::Bass),
            Source::Drums => Some(Stem::Drums),
            Source::Other => Some(Stem::Other),
            Source::Vocals => Some(Stem::Vocals),
            Source::Mix | Source::Harmonic | Source::Percussive => None,
        }
    }
}

/// Feature extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Analysis sample rate in Hz
    pub sample_rate: u32,
    /// STFT window length in samples
    pub window_size: usize,
    /// Hop between frames in samples
    pub hop_size: usize,
    pub bands_per_octave: usize,
    pub fmin: f64,
    pub fmax: f64,
    /// Ordered feature blocks
    pub sources: Vec<Source>,
    /// Median filter length for harmonic/percussive sources
    pub hpss_kernel: usize,
    /// Keep a trailing partial frame (ceil instead of floor)
    pub pad: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            window_size: 2048,
            hop_size: 441,
            bands_per_octave: 12,
            fmin: 30.0,
            fmax: 17000.0,
            sources: vec![Source::Bass, Source::Drums, Source::Other, Source::Vocals],
            hpss_kernel: 17,
            pad: false,
        }
    }
}

impl FeatureConfig {
    /// Frames per second
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_size as f64
    }

    pub fn filterbank(&self) -> LogFilterbank {
        LogFilterbank::new(
            self.sample_rate,
            self.window_size,
            self.bands_per_octave,
            self.fmin,
            self.fmax,
        )
    }

    /// Width of one frame's feature vector
    pub fn feature_dim(&self) -> usize {
        self.filterbank().num_bands() * self.sources.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.hop_size == 0 || self.window_size < 2 {
            return Err(AllInOneError::ConfigError(
                "sample_rate, hop_size and window_size must be positive".to_string(),
            ));
        }
        if self.fmin <= 0.0 || self.fmin >= self.fmax {
            return Err(AllInOneError::ConfigError(format!(
                "invalid band range {}..{} Hz",
                self.fmin, self.fmax
            )));
        }
        if self.sources.is_empty() {
            return Err(AllInOneError::ConfigError(
                "at least one feature source is required".to_string(),
            ));
        }
        if self.filterbank().num_bands() == 0 {
            return Err(AllInOneError::ConfigError(
                "filterbank has no bands; widen fmin..fmax or raise the window size".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fixed-rate sequence of frame feature vectors
#[derive(Debug, Clone)]
pub struct FrameSequence {
    /// Shape [frames, feature_dim]
    pub features: Array2<f32>,
    /// Frames per second
    pub frame_rate: f64,
}

impl FrameSequence {
    pub fn new(features: Array2<f32>, frame_rate: f64) -> Self {
        Self {
            features,
            frame_rate,
        }
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    /// Width of each feature vector
    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn frame(&self, index: usize) -> ArrayView1<'_, f32> {
        self.features.row(index)
    }

    /// Duration covered by the frames, in seconds
    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.frame_rate
    }
}

/// Extract the frame sequence for one track
///
/// Fails with `UnsupportedAudioFormat` for anything other than mono/stereo PCM,
/// `EmptyInput` for zero-length audio, and `MissingStem` when a configured
/// stem source was not supplied.
pub fn extract(
    waveform: &Waveform,
    stems: Option<&StemSet>,
    config: &FeatureConfig,
) -> Result<FrameSequence> {
    config.validate()?;
    let mix = prepare_signal(waveform, "mix", config.sample_rate)?;

    let num_frames = if config.pad {
        mix.len().div_ceil(config.hop_size)
    } else {
        mix.len() / config.hop_size
    };
    if num_frames == 0 {
        return Err(AllInOneError::EmptyInput {
            what: format!("mix (shorter than one {}-sample hop)", config.hop_size),
        });
    }

    let filterbank = config.filterbank();
    let band_spectrogram = |samples: &[f32]| {
        let spec = stft::magnitude_spectrogram(samples, config.window_size, config.hop_size, num_frames);
        filterbank.apply(spec.view())
    };

    let mut mix_bands: Option<Array2<f32>> = None;
    let mut split: Option<(Array2<f32>, Array2<f32>)> = None;
    let mut blocks: Vec<Array2<f32>> = Vec::with_capacity(config.sources.len());

    for &source in &config.sources {
        let block = match source.stem() {
            Some(stem) => {
                let stem_waveform = stems
                    .and_then(|s| s.get(stem))
                    .ok_or_else(|| AllInOneError::MissingStem {
                        stem: stem.name().to_string(),
                    })?;
                let samples = prepare_signal(stem_waveform, stem.name(), config.sample_rate)?;
                band_spectrogram(&samples)
            }
            None if source == Source::Mix => {
                mix_bands.get_or_insert_with(|| band_spectrogram(&mix)).clone()
            }
            None => {
                let (harmonic, percussive) = split.get_or_insert_with(|| {
                    let bands = mix_bands.get_or_insert_with(|| band_spectrogram(&mix));
                    hpss::separate(bands, config.hpss_kernel)
                });
                if source == Source::Harmonic {
                    harmonic.clone()
                } else {
                    percussive.clone()
                }
            }
        };
        blocks.push(block.mapv(|v| (1.0 + v).log10()));
    }

    let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
    let features = concatenate(Axis(1), &views)
        .map_err(|e| AllInOneError::ConfigError(format!("feature blocks disagree in shape: {}", e)))?;

    debug!(
        "Extracted {} frames x {} features ({} sources)",
        features.nrows(),
        features.ncols(),
        config.sources.len()
    );

    Ok(FrameSequence::new(features, config.frame_rate()))
}

/// Validate, downmix and resample one input signal
fn prepare_signal(waveform: &Waveform, what: &str, target_rate: u32) -> Result<Vec<f32>> {
    if waveform.channels == 0 || waveform.channels > 2 {
        return Err(AllInOneError::UnsupportedAudioFormat {
            reason: format!("{} has {} channels", what, waveform.channels),
        });
    }
    if waveform.sample_rate == 0 {
        return Err(AllInOneError::UnsupportedAudioFormat {
            reason: format!("{} has a sample rate of 0 Hz", what),
        });
    }
    if waveform.samples.len() % waveform.channels != 0 {
        return Err(AllInOneError::UnsupportedAudioFormat {
            reason: format!(
                "{} has {} interleaved samples, not a multiple of {} channels",
                what,
                waveform.samples.len(),
                waveform.channels
            ),
        });
    }
    if waveform.is_empty() {
        return Err(AllInOneError::EmptyInput {
            what: what.to_string(),
        });
    }

    Ok(resample(&waveform.to_mono(), waveform.sample_rate, target_rate))
}
