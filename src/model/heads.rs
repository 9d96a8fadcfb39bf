//! Per-frame task heads over the shared encoding

use super::layers::{sigmoid, softmax_in_place, Linear};
use super::weights::TensorStore;
use crate::error::Result;
use crate::types::Activations;
use ndarray::{Array2, ArrayView2};

#[derive(Debug, Clone)]
pub struct TaskHeads {
    beat: Linear,
    downbeat: Linear,
    section: Linear,
    function: Linear,
}

impl TaskHeads {
    pub fn load(tensors: &mut TensorStore, dim: usize, num_labels: usize) -> Result<Self> {
        Ok(Self {
            beat: Linear::load(tensors, "heads.beat", dim, 1)?,
            downbeat: Linear::load(tensors, "heads.downbeat", dim, 1)?,
            section: Linear::load(tensors, "heads.section", dim, 1)?,
            function: Linear::load(tensors, "heads.function", dim, num_labels)?,
        })
    }

    /// Map the encoding `[frames, dim]` to activations
    pub fn forward(&self, encoding: ArrayView2<'_, f32>, frame_rate: f64) -> Activations {
        let presence = |head: &Linear| -> Vec<f32> {
            head.forward(encoding).column(0).iter().map(|&v| sigmoid(v)).collect()
        };

        let mut labels: Array2<f32> = self.function.forward(encoding);
        for mut row in labels.rows_mut() {
            if let Some(values) = row.as_slice_mut() {
                softmax_in_place(values);
            }
        }

        Activations {
            beat: presence(&self.beat),
            downbeat: presence(&self.downbeat),
            boundary: presence(&self.section),
            labels,
            frame_rate,
        }
    }
}
