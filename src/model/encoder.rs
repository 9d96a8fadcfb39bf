//! Stacked neighborhood-attention encoder
//!
//! `embed` projects frame features to the model width, then each block applies
//! `x += attn(norm1(x))` and `x += mlp(norm2(x))`. A final layer norm closes
//! the stack.

use super::attention::NeighborhoodAttention;
use super::layers::{gelu, LayerNorm, Linear};
use super::weights::TensorStore;
use crate::error::{AllInOneError, Result};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Window shape of one encoder block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Neighbors per query, odd
    pub kernel_size: usize,
    /// Stride between neighbors in frames
    pub dilation: usize,
}

/// Architecture hyperparameters stored with every checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Feature vector width expected at the input
    pub input_dim: usize,
    pub dim: usize,
    pub num_heads: usize,
    /// Hidden width of the MLP as a multiple of `dim`
    #[serde(default = "default_mlp_ratio")]
    pub mlp_ratio: usize,
    pub blocks: Vec<BlockConfig>,
    /// Functional label classes of the function head
    pub num_labels: usize,
}

fn default_mlp_ratio() -> usize {
    4
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.dim == 0 || self.num_labels == 0 {
            return Err(AllInOneError::ConfigError(
                "model input_dim, dim and num_labels must be positive".to_string(),
            ));
        }
        if self.num_heads == 0 || self.dim % self.num_heads != 0 {
            return Err(AllInOneError::ConfigError(format!(
                "model dim {} is not divisible by {} heads",
                self.dim, self.num_heads
            )));
        }
        if self.blocks.is_empty() {
            return Err(AllInOneError::ConfigError(
                "model needs at least one encoder block".to_string(),
            ));
        }
        for (i, block) in self.blocks.iter().enumerate() {
            if block.kernel_size == 0 || block.kernel_size % 2 == 0 || block.dilation == 0 {
                return Err(AllInOneError::ConfigError(format!(
                    "block {}: kernel_size must be odd and dilation positive (got {} / {})",
                    i, block.kernel_size, block.dilation
                )));
            }
        }
        Ok(())
    }

    /// Fewest frames the encoder accepts
    pub fn min_frames(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.kernel_size * b.dilation)
            .max()
            .unwrap_or(1)
    }

    /// Farthest frame distance that can influence an output frame
    pub fn receptive_radius(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| (b.kernel_size - 1) * b.dilation)
            .sum()
    }

    pub fn mlp_dim(&self) -> usize {
        self.dim * self.mlp_ratio
    }
}

#[derive(Debug, Clone)]
struct Block {
    norm1: LayerNorm,
    attn: NeighborhoodAttention,
    norm2: LayerNorm,
    fc1: Linear,
    fc2: Linear,
}

impl Block {
    fn load(tensors: &mut TensorStore, index: usize, config: &ModelConfig) -> Result<Self> {
        let prefix = format!("blocks.{index}");
        let shape = config.blocks[index];
        Ok(Self {
            norm1: LayerNorm::load(tensors, &format!("{prefix}.norm1"), config.dim)?,
            attn: NeighborhoodAttention::load(
                tensors,
                &format!("{prefix}.attn"),
                config.dim,
                config.num_heads,
                shape.kernel_size,
                shape.dilation,
            )?,
            norm2: LayerNorm::load(tensors, &format!("{prefix}.norm2"), config.dim)?,
            fc1: Linear::load(tensors, &format!("{prefix}.mlp.fc1"), config.dim, config.mlp_dim())?,
            fc2: Linear::load(tensors, &format!("{prefix}.mlp.fc2"), config.mlp_dim(), config.dim)?,
        })
    }

    fn forward(&self, mut x: Array2<f32>) -> Result<Array2<f32>> {
        let attended = self.attn.forward(self.norm1.forward(x.view()).view())?;
        x += &attended;

        let mut hidden = self.fc1.forward(self.norm2.forward(x.view()).view());
        hidden.mapv_inplace(gelu);
        x += &self.fc2.forward(hidden.view());
        Ok(x)
    }
}

#[derive(Debug, Clone)]
pub struct Encoder {
    embed: Linear,
    blocks: Vec<Block>,
    norm: LayerNorm,
    min_frames: usize,
}

impl Encoder {
    pub fn load(tensors: &mut TensorStore, config: &ModelConfig) -> Result<Self> {
        let embed = Linear::load(tensors, "embed", config.input_dim, config.dim)?;
        let blocks = (0..config.blocks.len())
            .map(|i| Block::load(tensors, i, config))
            .collect::<Result<Vec<_>>>()?;
        let norm = LayerNorm::load(tensors, "norm", config.dim)?;
        Ok(Self {
            embed,
            blocks,
            norm,
            min_frames: config.min_frames(),
        })
    }

    /// Encode `[frames, input_dim]` into `[frames, dim]`
    pub fn forward(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        if features.nrows() < self.min_frames {
            return Err(AllInOneError::SequenceTooShort {
                length: features.nrows(),
                required: self.min_frames,
            });
        }

        let mut x = self.embed.forward(features);
        for block in &self.blocks {
            x = block.forward(x)?;
        }
        Ok(self.norm.forward(x.view()))
    }
}
