//! Per-track analysis parameters
//!
//! Feature extraction and decoding parameters, optionally loaded from a JSON
//! file. Every field has a default, so a file only needs the overrides:
//!
//! ```json
//! { "decoder": { "beat_threshold": 0.3, "min_segment_duration": 6.0 } }
//! ```

use crate::decode::DecoderConfig;
use crate::error::{AllInOneError, Result};
use crate::features::FeatureConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub features: FeatureConfig,
    pub decoder: DecoderConfig,
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AllInOneError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            AllInOneError::ConfigError(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.decoder.validate()
    }
}
