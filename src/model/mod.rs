//! Activation model: neighborhood-attention encoder plus task heads
//!
//! A `ModelState` is immutable once loaded and is shared between worker
//! threads behind an `Arc`. Inference never mutates it.

pub mod attention;
pub mod encoder;
pub mod ensemble;
pub mod heads;
pub mod layers;
pub mod store;
pub mod weights;

pub use encoder::{BlockConfig, ModelConfig};
pub use ensemble::Ensemble;

use crate::analysis::traits::ActivationModel;
use crate::error::{AllInOneError, Result};
use crate::features::FrameSequence;
use crate::types::Activations;
use encoder::Encoder;
use heads::TaskHeads;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};
use weights::{TensorStore, CONFIG_METADATA_KEY};

/// Loaded parameters of one trained model
#[derive(Debug, Clone)]
pub struct ModelState {
    name: String,
    config: ModelConfig,
    encoder: Encoder,
    heads: TaskHeads,
}

impl ModelState {
    /// Build from named tensors
    ///
    /// Every expected tensor must be present with the expected shape. Leftover
    /// tensors are reported and ignored.
    pub fn from_tensors(
        name: impl Into<String>,
        config: ModelConfig,
        mut tensors: TensorStore,
    ) -> Result<Self> {
        let name = name.into();
        config.validate()?;

        let encoder = Encoder::load(&mut tensors, &config)?;
        let heads = TaskHeads::load(&mut tensors, config.dim, config.num_labels)?;

        if !tensors.is_empty() {
            let unused: Vec<&str> = tensors.names().collect();
            warn!("Model '{}' has {} unused tensors: {}", name, unused.len(), unused.join(", "));
        }

        Ok(Self {
            name,
            config,
            encoder,
            heads,
        })
    }

    /// Load a safetensors checkpoint whose metadata carries the model config
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let checkpoint = weights::load_safetensors(path)?;
        let raw_config = checkpoint
            .metadata
            .get(CONFIG_METADATA_KEY)
            .ok_or_else(|| AllInOneError::model_load(&name, "checkpoint metadata has no 'config' entry"))?;
        let config: ModelConfig = serde_json::from_str(raw_config)
            .map_err(|e| AllInOneError::model_load(&name, format!("invalid config metadata: {}", e)))?;

        let state = Self::from_tensors(name, config, checkpoint.tensors)?;
        info!(
            "Loaded model '{}' ({} blocks, dim {}, {} labels)",
            state.name,
            state.config.blocks.len(),
            state.config.dim,
            state.config.num_labels
        );
        Ok(state)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Write a model config as checkpoint metadata
    pub fn metadata(config: &ModelConfig) -> Result<HashMap<String, String>> {
        let json = serde_json::to_string(config)
            .map_err(|e| AllInOneError::ConfigError(format!("cannot serialize model config: {}", e)))?;
        Ok(HashMap::from([(CONFIG_METADATA_KEY.to_string(), json)]))
    }
}

impl ActivationModel for ModelState {
    fn infer(&self, frames: &FrameSequence) -> Result<Activations> {
        if frames.dim() != self.config.input_dim {
            return Err(AllInOneError::FeatureMismatch {
                expected: self.config.input_dim,
                actual: frames.dim(),
            });
        }
        if frames.len() < self.config.min_frames() {
            return Err(AllInOneError::SequenceTooShort {
                length: frames.len(),
                required: self.config.min_frames(),
            });
        }

        debug!("Running '{}' on {} frames", self.name, frames.len());
        let encoding = self.encoder.forward(frames.features.view())?;
        Ok(self.heads.forward(encoding.view(), frames.frame_rate))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    fn num_labels(&self) -> usize {
        self.config.num_labels
    }

    fn min_frames(&self) -> usize {
        self.config.min_frames()
    }
}

/// Deterministic stand-in parameters for tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    /// Fill every tensor `config` needs with a smooth pseudo-random pattern
    pub fn tensors(config: &ModelConfig, seed: usize) -> TensorStore {
        let mut store = TensorStore::new();
        let mut counter = seed;
        let mut add = |name: String, shape: &[usize], scale: f32| {
            counter += 1;
            let base = counter * 1013;
            let values = (0..shape.iter().product::<usize>())
                .map(|i| ((base + i * 7919) as f32 * 0.618).sin() * scale)
                .collect();
            store.insert(name, ArrayD::from_shape_vec(IxDyn(shape), values).unwrap());
        };

        let (d, h) = (config.dim, config.mlp_dim());
        let w = |fan_in: usize| 1.0 / (fan_in as f32).sqrt();
        add("embed.weight".into(), &[d, config.input_dim], w(config.input_dim));
        add("embed.bias".into(), &[d], 0.01);
        for i in 0..config.blocks.len() {
            add(format!("blocks.{i}.norm1.weight"), &[d], 0.0);
            add(format!("blocks.{i}.norm1.bias"), &[d], 0.0);
            add(format!("blocks.{i}.attn.qkv.weight"), &[3 * d, d], w(d));
            add(format!("blocks.{i}.attn.qkv.bias"), &[3 * d], 0.01);
            add(format!("blocks.{i}.attn.proj.weight"), &[d, d], w(d));
            add(format!("blocks.{i}.attn.proj.bias"), &[d], 0.01);
            add(format!("blocks.{i}.norm2.weight"), &[d], 0.0);
            add(format!("blocks.{i}.norm2.bias"), &[d], 0.0);
            add(format!("blocks.{i}.mlp.fc1.weight"), &[h, d], w(d));
            add(format!("blocks.{i}.mlp.fc1.bias"), &[h], 0.01);
            add(format!("blocks.{i}.mlp.fc2.weight"), &[d, h], w(h));
            add(format!("blocks.{i}.mlp.fc2.bias"), &[d], 0.01);
        }
        add("norm.weight".into(), &[d], 0.0);
        add("norm.bias".into(), &[d], 0.0);
        for head in ["beat", "downbeat", "section"] {
            add(format!("heads.{head}.weight"), &[1, d], w(d));
            add(format!("heads.{head}.bias"), &[1], 0.1);
        }
        add("heads.function.weight".into(), &[config.num_labels, d], w(d));
        add("heads.function.bias".into(), &[config.num_labels], 0.1);

        // Norm gains of one
        for i in 0..config.blocks.len() {
            for norm in ["norm1", "norm2"] {
                store.insert(format!("blocks.{i}.{norm}.weight"), ArrayD::ones(IxDyn(&[d])));
            }
        }
        store.insert("norm.weight", ArrayD::ones(IxDyn(&[d])));
        store
    }

    pub fn small_config() -> ModelConfig {
        ModelConfig {
            input_dim: 6,
            dim: 8,
            num_heads: 2,
            mlp_ratio: 2,
            blocks: vec![
                BlockConfig { kernel_size: 5, dilation: 1 },
                BlockConfig { kernel_size: 5, dilation: 2 },
                BlockConfig { kernel_size: 3, dilation: 4 },
            ],
            num_labels: 4,
        }
    }

    pub fn state(config: ModelConfig, seed: usize) -> ModelState {
        let tensors = tensors(&config, seed);
        ModelState::from_tensors(format!("test-{seed}"), config, tensors).unwrap()
    }
}
