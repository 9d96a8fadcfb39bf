//! Dilated 1-D neighborhood attention
//!
//! Each query frame attends to exactly `kernel_size` key frames drawn from its
//! own dilation group (frames congruent to it modulo `dilation`). The window
//! is centered on the query and slides inward at the sequence edges, so the
//! number of attended frames never changes. No positional bias is learned.

use super::layers::{softmax_in_place, Linear};
use super::weights::TensorStore;
use crate::error::{AllInOneError, Result};
use ndarray::{s, Array2, ArrayView2};

#[derive(Debug, Clone)]
pub struct NeighborhoodAttention {
    qkv: Linear,
    proj: Linear,
    num_heads: usize,
    kernel_size: usize,
    dilation: usize,
}

impl NeighborhoodAttention {
    pub fn load(
        tensors: &mut TensorStore,
        prefix: &str,
        dim: usize,
        num_heads: usize,
        kernel_size: usize,
        dilation: usize,
    ) -> Result<Self> {
        Ok(Self {
            qkv: Linear::load(tensors, &format!("{prefix}.qkv"), dim, 3 * dim)?,
            proj: Linear::load(tensors, &format!("{prefix}.proj"), dim, dim)?,
            num_heads,
            kernel_size,
            dilation,
        })
    }

    /// Shortest sequence for which every query has a full neighborhood
    pub fn min_len(&self) -> usize {
        self.kernel_size * self.dilation
    }

    /// Attend over `x` (`[frames, dim]`), returning the same shape
    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let (len, dim) = x.dim();
        if len < self.min_len() {
            return Err(AllInOneError::SequenceTooShort {
                length: len,
                required: self.min_len(),
            });
        }

        let qkv = self.qkv.forward(x);
        let head_dim = dim / self.num_heads;
        let scale = (head_dim as f32).powf(-0.5);

        let mut context = Array2::<f32>::zeros((len, dim));
        let mut neighbors = Vec::with_capacity(self.kernel_size);
        let mut weights = vec![0.0f32; self.kernel_size];

        for i in 0..len {
            neighbors.clear();
            neighbors.extend(neighborhood(i, len, self.kernel_size, self.dilation));

            for h in 0..self.num_heads {
                let lo = h * head_dim;
                let hi = lo + head_dim;
                let query = qkv.slice(s![i, lo..hi]);

                for (w, &j) in weights.iter_mut().zip(&neighbors) {
                    let key = qkv.slice(s![j, dim + lo..dim + hi]);
                    *w = query.dot(&key) * scale;
                }
                softmax_in_place(&mut weights);

                let mut out = context.slice_mut(s![i, lo..hi]);
                for (&w, &j) in weights.iter().zip(&neighbors) {
                    let value = qkv.slice(s![j, 2 * dim + lo..2 * dim + hi]);
                    out.scaled_add(w, &value);
                }
            }
        }

        Ok(self.proj.forward(context.view()))
    }
}

/// Key frames attended by query `index` in a sequence of length `len`
///
/// Requires `len >= kernel_size * dilation`.
pub fn neighborhood(
    index: usize,
    len: usize,
    kernel_size: usize,
    dilation: usize,
) -> impl Iterator<Item = usize> {
    let group = index % dilation;
    let group_len = (len - group).div_ceil(dilation);
    let position = index / dilation;
    let start = position
        .saturating_sub(kernel_size / 2)
        .min(group_len.saturating_sub(kernel_size));
    (start..start + kernel_size).map(move |m| group + m * dilation)
}
