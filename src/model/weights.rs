//! Checkpoint tensors
//!
//! Checkpoints are safetensors files holding `f32` tensors in PyTorch layout
//! (`[out, in]` for linear weights) and the model configuration as JSON under
//! the `config` metadata key.

use crate::error::{AllInOneError, Result};
use ndarray::{Array1, Array2, ArrayD, IxDyn};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::warn;

/// Metadata key holding the serialized `ModelConfig`
pub const CONFIG_METADATA_KEY: &str = "config";

/// Named tensors of one checkpoint
#[derive(Debug, Clone, Default)]
pub struct TensorStore {
    tensors: BTreeMap<String, ArrayD<f32>>,
}

impl TensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn remove(&mut self, name: &str) -> Option<ArrayD<f32>> {
        self.tensors.remove(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Remove and return a rank-2 tensor of the given shape
    pub fn take2(&mut self, name: &str, rows: usize, cols: usize) -> Result<Array2<f32>> {
        let tensor = self.take(name, &[rows, cols])?;
        tensor
            .into_dimensionality()
            .map_err(|e| AllInOneError::model_load(name, e.to_string()))
    }

    /// Remove and return a rank-1 tensor of the given length
    pub fn take1(&mut self, name: &str, len: usize) -> Result<Array1<f32>> {
        let tensor = self.take(name, &[len])?;
        tensor
            .into_dimensionality()
            .map_err(|e| AllInOneError::model_load(name, e.to_string()))
    }

    fn take(&mut self, name: &str, shape: &[usize]) -> Result<ArrayD<f32>> {
        let tensor = self
            .tensors
            .remove(name)
            .ok_or_else(|| AllInOneError::model_load(name, "tensor missing from checkpoint"))?;
        if tensor.shape() != shape {
            return Err(AllInOneError::model_load(
                name,
                format!("expected shape {:?}, found {:?}", shape, tensor.shape()),
            ));
        }
        Ok(tensor)
    }

    /// Drop relative-positional-bias tensors left by older attention kernels
    ///
    /// Returns the removed names.
    pub fn drop_legacy_rpb(&mut self) -> Vec<String> {
        let legacy: Vec<String> = self
            .tensors
            .keys()
            .filter(|k| k.to_lowercase().contains("rpb"))
            .cloned()
            .collect();
        for key in &legacy {
            self.tensors.remove(key);
        }
        legacy
    }
}

/// A decoded checkpoint file
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub tensors: TensorStore,
    pub metadata: HashMap<String, String>,
}

/// Read a safetensors checkpoint from disk
pub fn load_safetensors(path: &Path) -> Result<Checkpoint> {
    let name = path.display().to_string();
    let data = std::fs::read(path)
        .map_err(|e| AllInOneError::model_load(&name, format!("Failed to read file: {}", e)))?;

    let (_, header) = SafeTensors::read_metadata(&data)
        .map_err(|e| AllInOneError::model_load(&name, format!("Invalid safetensors header: {}", e)))?;
    let metadata = header.metadata().clone().unwrap_or_default();

    let tensors = SafeTensors::deserialize(&data)
        .map_err(|e| AllInOneError::model_load(&name, format!("Invalid safetensors data: {}", e)))?;

    let mut store = TensorStore::new();
    for (tensor_name, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(AllInOneError::model_load(
                &name,
                format!("tensor '{}' has dtype {:?}, only F32 is supported", tensor_name, view.dtype()),
            ));
        }
        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let array = ArrayD::from_shape_vec(IxDyn(view.shape()), values)
            .map_err(|e| AllInOneError::model_load(&name, format!("tensor '{}': {}", tensor_name, e)))?;
        store.insert(tensor_name, array);
    }

    let legacy = store.drop_legacy_rpb();
    if !legacy.is_empty() {
        warn!(
            "Removed {} relative positional bias tensors from {}; this checkpoint predates the current attention layout, retrain for best results",
            legacy.len(),
            path.display()
        );
    }

    Ok(Checkpoint {
        tensors: store,
        metadata,
    })
}

/// Write tensors and metadata as a safetensors file
pub fn save_safetensors(
    path: &Path,
    store: &TensorStore,
    metadata: HashMap<String, String>,
) -> Result<()> {
    let bytes: Vec<(String, Vec<u8>, Vec<usize>)> = store
        .tensors
        .iter()
        .map(|(name, tensor)| {
            let data = tensor.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.clone(), data, tensor.shape().to_vec())
        })
        .collect();

    let mut views = Vec::with_capacity(bytes.len());
    for (name, data, shape) in &bytes {
        let view = TensorView::new(Dtype::F32, shape.clone(), data)
            .map_err(|e| AllInOneError::model_load(name, e.to_string()))?;
        views.push((name.as_str(), view));
    }

    let serialized = safetensors::serialize(views, &Some(metadata))
        .map_err(|e| AllInOneError::model_load(path.display().to_string(), e.to_string()))?;

    std::fs::write(path, serialized).map_err(|e| AllInOneError::output_error(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_take_checks_shape() {
        let mut store = TensorStore::new();
        store.insert("w", arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn());
        let err = store.take2("w", 2, 3).unwrap_err();
        assert!(err.to_string().contains("expected shape"));
    }

    #[test]
    fn test_take_missing() {
        let mut store = TensorStore::new();
        assert!(store.take1("nope", 3).is_err());
    }

    #[test]
    fn test_drop_legacy_rpb() {
        let mut store = TensorStore::new();
        store.insert("blocks.0.attn.rpb", ArrayD::zeros(IxDyn(&[2, 9])));
        store.insert("blocks.0.attn.RPB_extra", ArrayD::zeros(IxDyn(&[1])));
        store.insert("blocks.0.attn.qkv.weight", ArrayD::zeros(IxDyn(&[3, 1])));

        let removed = store.drop_legacy_rpb();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["blocks.0.attn.qkv.weight"]);
    }

    #[test]
    fn test_safetensors_roundtrip_keeps_metadata() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tiny.safetensors");

        let mut store = TensorStore::new();
        store.insert("a", arr2(&[[1.0f32, -2.0, 3.5]]).into_dyn());
        store.insert("legacy.rpb", ArrayD::zeros(IxDyn(&[4])));
        let mut meta = HashMap::new();
        meta.insert(CONFIG_METADATA_KEY.to_string(), "{}".to_string());
        save_safetensors(&path, &store, meta).unwrap();

        let mut checkpoint = load_safetensors(&path).unwrap();
        assert_eq!(checkpoint.metadata.get(CONFIG_METADATA_KEY).map(String::as_str), Some("{}"));
        assert_eq!(checkpoint.tensors.len(), 1, "rpb tensor should be dropped on load");
        let a = checkpoint.tensors.take2("a", 1, 3).unwrap();
        assert_eq!(a, arr2(&[[1.0f32, -2.0, 3.5]]));
    }
}
