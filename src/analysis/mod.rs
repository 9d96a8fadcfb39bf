//! Per-track analysis
//!
//! `extract → infer → decode` for one waveform. The model and stem source are
//! trait objects so the batch pipeline and tests can swap them freely.

pub mod stems;
pub mod traits;

pub use stems::{DirectoryStems, NoStems};
pub use traits::{ActivationModel, StemProvider};

use crate::config::AnalysisConfig;
use crate::decode;
use crate::error::{AllInOneError, Result};
use crate::features;
use crate::types::{Activations, StemSet, TrackAnalysis, Waveform};
use tracing::debug;

/// Check that a model fits the feature and label configuration
///
/// Run once per batch; a mismatch would fail every track the same way.
pub fn check_model(model: &dyn ActivationModel, config: &AnalysisConfig) -> Result<()> {
    let feature_dim = config.features.feature_dim();
    if feature_dim != model.input_dim() {
        return Err(AllInOneError::FeatureMismatch {
            expected: model.input_dim(),
            actual: feature_dim,
        });
    }
    if model.num_labels() != config.decoder.labels.len() {
        return Err(AllInOneError::ConfigError(format!(
            "model '{}' predicts {} labels but {} label names are configured",
            model.name(),
            model.num_labels(),
            config.decoder.labels.len()
        )));
    }
    Ok(())
}

/// Run feature extraction and the model on one track
pub fn infer_activations(
    waveform: &Waveform,
    stems: Option<&StemSet>,
    model: &dyn ActivationModel,
    config: &AnalysisConfig,
) -> Result<Activations> {
    check_model(model, config)?;
    let frames = features::extract(waveform, stems, &config.features)?;

    debug!("Inferring {} frames with '{}'", frames.len(), model.name());
    model.infer(&frames)
}

/// Analyze one track end to end
pub fn analyze(
    waveform: &Waveform,
    stems: Option<&StemSet>,
    model: &dyn ActivationModel,
    config: &AnalysisConfig,
) -> Result<TrackAnalysis> {
    let activations = infer_activations(waveform, stems, model, config)?;
    decode::decode(&activations, &config.decoder)
}
