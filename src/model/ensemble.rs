//! Averaging ensemble of independently trained models
//!
//! Members run on the same frames and their activations are averaged per
//! frame. Label distributions stay normalized because each member's rows
//! sum to one.

use super::ModelState;
use crate::analysis::traits::ActivationModel;
use crate::error::{AllInOneError, Result};
use crate::features::FrameSequence;
use crate::types::Activations;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Ensemble {
    name: String,
    members: Vec<Arc<ModelState>>,
}

impl Ensemble {
    /// Members must agree on input width and label count
    pub fn new(name: impl Into<String>, members: Vec<Arc<ModelState>>) -> Result<Self> {
        let name = name.into();
        let first = members
            .first()
            .ok_or_else(|| AllInOneError::model_load(&name, "ensemble has no members"))?;

        for member in &members[1..] {
            if member.input_dim() != first.input_dim() || member.num_labels() != first.num_labels() {
                return Err(AllInOneError::model_load(
                    &name,
                    format!(
                        "member '{}' ({} inputs, {} labels) disagrees with '{}' ({} inputs, {} labels)",
                        member.name(),
                        member.input_dim(),
                        member.num_labels(),
                        first.name(),
                        first.input_dim(),
                        first.num_labels()
                    ),
                ));
            }
        }

        Ok(Self { name, members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl ActivationModel for Ensemble {
    fn infer(&self, frames: &FrameSequence) -> Result<Activations> {
        if frames.len() < self.min_frames() {
            return Err(AllInOneError::SequenceTooShort {
                length: frames.len(),
                required: self.min_frames(),
            });
        }

        let mut members = self.members.iter();
        let Some(first) = members.next() else {
            return Err(AllInOneError::model_load(&self.name, "ensemble has no members"));
        };

        let mut total = first.infer(frames)?;
        for member in members {
            debug!("Ensemble '{}': running member '{}'", self.name, member.name());
            let act = member.infer(frames)?;
            add_in_place(&mut total.beat, &act.beat);
            add_in_place(&mut total.downbeat, &act.downbeat);
            add_in_place(&mut total.boundary, &act.boundary);
            total.labels += &act.labels;
        }

        let scale = 1.0 / self.members.len() as f32;
        for curve in [&mut total.beat, &mut total.downbeat, &mut total.boundary] {
            curve.iter_mut().for_each(|v| *v *= scale);
        }
        total.labels.mapv_inplace(|v| v * scale);
        Ok(total)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_dim(&self) -> usize {
        self.members.first().map(|m| m.input_dim()).unwrap_or(0)
    }

    fn num_labels(&self) -> usize {
        self.members.first().map(|m| m.num_labels()).unwrap_or(0)
    }

    fn min_frames(&self) -> usize {
        self.members.iter().map(|m| m.min_frames()).max().unwrap_or(1)
    }
}

fn add_in_place(total: &mut [f32], other: &[f32]) {
    total.iter_mut().zip(other).for_each(|(t, &o)| *t += o);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::{small_config, state};
    use crate::model::{BlockConfig, ModelConfig};
    use ndarray::Array2;

    fn frames(len: usize) -> FrameSequence {
        FrameSequence::new(
            Array2::from_shape_fn((len, 6), |(t, c)| ((t + c) as f32 * 0.3).cos().abs()),
            100.0,
        )
    }

    #[test]
    fn test_ensemble_averages_members() {
        let a = Arc::new(state(small_config(), 1));
        let b = Arc::new(state(small_config(), 2));
        let input = frames(40);

        let act_a = a.infer(&input).unwrap();
        let act_b = b.infer(&input).unwrap();
        let ensemble = Ensemble::new("pair", vec![a, b]).unwrap();
        let act = ensemble.infer(&input).unwrap();

        for t in 0..40 {
            assert!((act.beat[t] - (act_a.beat[t] + act_b.beat[t]) / 2.0).abs() < 1e-6);
            assert!((act.labels.row(t).sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_ensemble_uses_largest_minimum_length() {
        let wide = ModelConfig {
            blocks: vec![BlockConfig { kernel_size: 7, dilation: 4 }],
            ..small_config()
        };
        let ensemble = Ensemble::new(
            "mixed",
            vec![Arc::new(state(small_config(), 1)), Arc::new(state(wide, 2))],
        )
        .unwrap();
        assert_eq!(ensemble.min_frames(), 28);
    }

    #[test]
    fn test_ensemble_rejects_label_mismatch() {
        let other = ModelConfig {
            num_labels: 5,
            ..small_config()
        };
        let err = Ensemble::new(
            "bad",
            vec![Arc::new(state(small_config(), 1)), Arc::new(state(other, 2))],
        )
        .unwrap_err();
        assert!(err.to_string().contains("disagrees"));
    }

    #[test]
    fn test_empty_ensemble_rejected() {
        assert!(Ensemble::new("none", vec![]).is_err());
    }
}
