//! Analysis trait abstractions
//!
//! These traits define the interface for swappable analysis backends: the
//! model that turns frames into activations, and the source of pre-separated
//! stems.

use crate::error::Result;
use crate::features::FrameSequence;
use crate::types::{Activations, StemSet};
use std::path::Path;

/// Frame sequence to per-frame activations
///
/// Implementations are immutable after construction and shared across worker
/// threads.
pub trait ActivationModel: Send + Sync {
    /// Run the encoder and task heads over one track
    fn infer(&self, frames: &FrameSequence) -> Result<Activations>;

    /// Get the name of this model (for logging)
    fn name(&self) -> &str;

    /// Feature vector width the model accepts
    fn input_dim(&self) -> usize;

    /// Number of functional label classes produced
    fn num_labels(&self) -> usize;

    /// Fewest frames the model accepts
    fn min_frames(&self) -> usize;
}

/// Stem separation backend
///
/// Separation itself happens outside this crate; providers hand over stems
/// that already exist.
pub trait StemProvider: Send + Sync {
    /// Stems for the track at `track_path`, or `None` when the provider has none
    fn stems_for(&self, track_path: &Path) -> Result<Option<StemSet>>;

    /// Get the name of this provider (for logging)
    fn name(&self) -> &'static str;
}
