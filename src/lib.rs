//! allin1 - All-in-one music structure analysis
//!
//! Predicts beats, downbeats, tempo and functional segments (intro, verse,
//! chorus, ...) for audio files with a neighborhood-attention sequence model,
//! and scores predictions against reference annotations.
//!
//! # Architecture
//!
//! - `audio`: file decoding with symphonia and resampling with rubato
//! - `features`: log-frequency spectrogram frames, optionally per stem or
//!   per harmonic/percussive component
//! - `model`: safetensors checkpoints, the dilated neighborhood-attention
//!   encoder, the four task heads and fold ensembles
//! - `decode`: peak picking that turns activations into beats, downbeats and
//!   labeled segments
//! - `analysis`: the per-track `extract → infer → decode` path
//! - `eval`: beat, downbeat, boundary and labeling metrics
//! - `discovery`, `pipeline`, `export`: the parallel batch CLI
//!
//! # Example
//!
//! ```no_run
//! use allin1::{config::Settings, pipeline};
//!
//! let settings = Settings::default();
//! let result = pipeline::run(&settings).expect("Analysis failed");
//! println!("Processed {} tracks", result.successful);
//! ```

pub mod analysis;
pub mod audio;
pub mod config;
pub mod decode;
pub mod discovery;
pub mod error;
pub mod eval;
pub mod export;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod types;

// Re-export key types at crate root
pub use error::{AllInOneError, Result};
pub use types::{Activations, Event, Segment, Stem, StemSet, TrackAnalysis, Waveform};
