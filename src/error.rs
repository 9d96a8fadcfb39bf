//! Unified error types for allin1
//!
//! Error strategy:
//! - Per-track errors (decode, input shape, no beats): recoverable, skip and continue
//! - System errors (model loading, output): fatal, abort batch
//!
//! All errors include actionable suggestions where possible.

use crate::types::Segment;
use std::path::PathBuf;
use thiserror::Error;

/// Supported audio formats for helpful error messages
pub const SUPPORTED_FORMATS: &str = "MP3, WAV, FLAC, AIFF, OGG";

/// Top-level error type for allin1 operations
#[derive(Debug, Error)]
pub enum AllInOneError {
    // =========================================================================
    // Core errors - raised at the component boundary that owns the precondition
    // =========================================================================
    #[error("Unsupported audio format: {reason}\n  Expected mono or stereo PCM with a non-zero sample rate")]
    UnsupportedAudioFormat { reason: String },

    #[error("Empty input: {what} contains no samples")]
    EmptyInput { what: String },

    #[error("Sequence too short: {length} frames, encoder needs at least {required}\n  Tip: Tracks shorter than {required} frames cannot be analyzed by this model")]
    SequenceTooShort { length: usize, required: usize },

    /// `segments` holds the segmentation decoded from the same activations
    #[error("No beats detected: peak beat activation {peak:.3} never reached the confidence floor {threshold:.3}")]
    NoBeatsDetected {
        peak: f32,
        threshold: f32,
        segments: Vec<Segment>,
    },

    // =========================================================================
    // Recoverable errors - skip track, continue batch
    // =========================================================================
    #[error("Failed to decode audio file '{path}': {reason}\n  Supported formats: {SUPPORTED_FORMATS}\n  Tip: If the file plays in other apps, it may be corrupted or use an unsupported codec")]
    DecodeError { path: PathBuf, reason: String },

    #[error("Unsupported file type '{format}' for '{path}'\n  Supported formats: {SUPPORTED_FORMATS}")]
    UnsupportedFormat { path: PathBuf, format: String },

    #[error("Stem '{stem}' is required by the feature configuration but was not supplied\n  Tip: Run stem separation first and pass --stems-dir, or configure sources = [\"harmonic\", \"percussive\"]")]
    MissingStem { stem: String },

    // =========================================================================
    // Fatal errors - abort entire batch
    // =========================================================================
    #[error("Feature width {actual} does not match model input width {expected}\n  Tip: The feature configuration must match the one the model was trained with")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Failed to load model '{name}': {reason}")]
    ModelLoad { name: String, reason: String },

    #[error("Model '{name}' not found.\n\n  Locations checked:\n{locations}\n\n  Tip: Set ALLIN1_MODEL_DIR to the directory holding the .safetensors checkpoints")]
    ModelNotFound { name: String, locations: String },

    #[error("Checksum mismatch for '{path}': expected {expected}, got {actual}\n  Tip: The checkpoint is corrupt or was replaced, re-download it")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Cannot write output to '{path}': {reason}\n  Tip: Check write permissions for the output directory")]
    OutputError { path: PathBuf, reason: String },

    #[error("Input path does not exist: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for allin1 operations
pub type Result<T> = std::result::Result<T, AllInOneError>;

impl AllInOneError {
    /// Returns true if this error is recoverable (should skip track, continue batch)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AllInOneError::UnsupportedAudioFormat { .. }
                | AllInOneError::EmptyInput { .. }
                | AllInOneError::SequenceTooShort { .. }
                | AllInOneError::NoBeatsDetected { .. }
                | AllInOneError::DecodeError { .. }
                | AllInOneError::UnsupportedFormat { .. }
                | AllInOneError::MissingStem { .. }
        )
    }

    /// Create a decode error with context about the issue
    pub fn decode_error(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AllInOneError::DecodeError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a model load error
    pub fn model_load(name: impl Into<String>, reason: impl Into<String>) -> Self {
        AllInOneError::ModelLoad {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an output error, checking for common issues
    pub fn output_error(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        let reason = match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                format!("Permission denied. Check that you have write access to {}", path.display())
            }
            std::io::ErrorKind::NotFound => {
                format!("Directory does not exist: {}", path.parent().map(|p| p.display().to_string()).unwrap_or_default())
            }
            _ => err.to_string(),
        };
        AllInOneError::OutputError { path, reason }
    }
}
