//! Dense building blocks shared by the encoder and the task heads

use super::weights::TensorStore;
use crate::error::Result;
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Affine map `y = x Wᵀ + b` with `W` stored as `[out, in]`
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Self {
        debug_assert_eq!(weight.nrows(), bias.len());
        Self { weight, bias }
    }

    /// Load `{prefix}.weight` and `{prefix}.bias`
    pub fn load(tensors: &mut TensorStore, prefix: &str, input: usize, output: usize) -> Result<Self> {
        let weight = tensors.take2(&format!("{prefix}.weight"), output, input)?;
        let bias = tensors.take1(&format!("{prefix}.bias"), output)?;
        Ok(Self::new(weight, bias))
    }

    pub fn output_dim(&self) -> usize {
        self.weight.nrows()
    }

    /// Apply to every row of `x` (`[frames, in]` → `[frames, out]`)
    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut y = x.dot(&self.weight.t());
        y += &self.bias;
        y
    }
}

/// Per-frame layer normalization over the feature axis
#[derive(Debug, Clone)]
pub struct LayerNorm {
    weight: Array1<f32>,
    bias: Array1<f32>,
    eps: f32,
}

impl LayerNorm {
    pub const EPS: f32 = 1e-5;

    pub fn load(tensors: &mut TensorStore, prefix: &str, dim: usize) -> Result<Self> {
        Ok(Self {
            weight: tensors.take1(&format!("{prefix}.weight"), dim)?,
            bias: tensors.take1(&format!("{prefix}.bias"), dim)?,
            eps: Self::EPS,
        })
    }

    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut out = x.to_owned();
        for mut row in out.axis_iter_mut(Axis(0)) {
            let n = row.len() as f32;
            let mean = row.sum() / n;
            let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
            let inv_std = 1.0 / (var + self.eps).sqrt();
            row.iter_mut()
                .zip(self.weight.iter().zip(self.bias.iter()))
                .for_each(|(v, (&w, &b))| *v = (*v - mean) * inv_std * w + b);
        }
        out
    }
}

/// GELU, tanh approximation
pub fn gelu(x: f32) -> f32 {
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + 0.044_715 * x * x * x)).tanh())
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax in place
pub fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        let uniform = 1.0 / values.len().max(1) as f32;
        values.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    let mut total = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        total += *v;
    }
    values.iter_mut().for_each(|v| *v /= total);
}
