//! Checkpoint discovery and loading
//!
//! A model is named either by a path to a `.safetensors` file or by a
//! registry name. `harmonix-fold0` .. `harmonix-fold7` are single models
//! trained on the eight Harmonix folds; `harmonix-all` averages all eight.
//!
//! Search order for named checkpoints:
//! 1. An explicit model directory (`--model-dir`)
//! 2. ALLIN1_MODEL_DIR environment variable
//! 3. ProjectDirs cache: ~/.cache/allin1/models (Linux)
//! 4. ProjectDirs data: ~/.local/share/allin1/models (Linux XDG)
//! 5. Current directory: ./models
//! 6. Home directory: ~/allin1/models
//!
//! A `<checkpoint>.sha256` file next to a checkpoint is verified before load.

use super::{Ensemble, ModelState};
use crate::analysis::traits::ActivationModel;
use crate::error::{AllInOneError, Result};
use directories::ProjectDirs;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_MODEL: &str = "harmonix-all";
pub const CHECKPOINT_EXTENSION: &str = "safetensors";
const ENSEMBLE_PREFIX: &str = "harmonix-fold";
const NUM_FOLDS: usize = 8;

fn fold_names() -> Vec<String> {
    (0..NUM_FOLDS).map(|i| format!("{ENSEMBLE_PREFIX}{i}")).collect()
}

/// Checkpoint names behind a registry name
///
/// Names outside the registry fail with `ModelNotFound`; custom checkpoints
/// are loaded by path instead.
pub fn members_of(name: &str) -> Result<Vec<String>> {
    let folds = fold_names();
    if name == DEFAULT_MODEL {
        return Ok(folds);
    }
    if folds.iter().any(|fold| fold == name) {
        return Ok(vec![name.to_string()]);
    }

    let known = std::iter::once(DEFAULT_MODEL.to_string())
        .chain(folds)
        .map(|n| format!("  - {n}"))
        .collect::<Vec<_>>()
        .join("\n");
    Err(AllInOneError::ModelNotFound {
        name: name.to_string(),
        locations: format!(
            "  (none, not a known model name)\n\n  Known models:\n{known}\n  - or a path to a .{CHECKPOINT_EXTENSION} file"
        ),
    })
}

/// Directories searched for named checkpoints, in priority order
pub fn search_dirs(model_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = model_dir {
        dirs.push(dir.to_path_buf());
    }
    if let Some(env_dir) = std::env::var_os("ALLIN1_MODEL_DIR") {
        dirs.push(PathBuf::from(env_dir));
    }
    if let Some(proj_dirs) = ProjectDirs::from("com", "allin1", "allin1") {
        dirs.push(proj_dirs.cache_dir().join("models"));
        dirs.push(proj_dirs.data_dir().join("models"));
    }
    dirs.push(PathBuf::from("./models"));
    if let Some(base_dirs) = directories::BaseDirs::new() {
        dirs.push(base_dirs.home_dir().join("allin1").join("models"));
    }
    dirs
}

/// Locate `<name>.safetensors` in the first directory that has it
pub fn find_checkpoint(name: &str, dirs: &[PathBuf]) -> Result<PathBuf> {
    let filename = format!("{name}.{CHECKPOINT_EXTENSION}");
    for dir in dirs {
        let candidate = dir.join(&filename);
        if candidate.is_file() {
            debug!("Found checkpoint '{}' at {}", name, candidate.display());
            return Ok(candidate);
        }
    }

    let locations = dirs
        .iter()
        .map(|d| format!("  - {}", d.join(&filename).display()))
        .collect::<Vec<_>>()
        .join("\n");
    Err(AllInOneError::ModelNotFound {
        name: name.to_string(),
        locations,
    })
}

/// Check a checkpoint against its `.sha256` sidecar, if one exists
pub fn verify_checksum(path: &Path) -> Result<()> {
    let mut sidecar = path.as_os_str().to_os_string();
    sidecar.push(".sha256");
    let sidecar = PathBuf::from(sidecar);

    let expected = match fs::read_to_string(&sidecar) {
        Ok(contents) => contents
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase(),
        Err(_) => {
            debug!("No checksum file for {}, skipping verification", path.display());
            return Ok(());
        }
    };

    let actual = sha256_file(path)?;
    if actual != expected {
        return Err(AllInOneError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    debug!("Checksum verified for {}", path.display());
    Ok(())
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| {
        AllInOneError::model_load(path.display().to_string(), format!("Failed to open for verification: {}", e))
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn load_checkpoint(path: &Path) -> Result<ModelState> {
    verify_checksum(path)?;
    ModelState::load(path)
}

/// Resolve a model name or checkpoint path to a ready model
///
/// Ensemble members are loaded in parallel.
pub fn load_model(spec: &str, model_dir: Option<&Path>) -> Result<Arc<dyn ActivationModel>> {
    let as_path = Path::new(spec);
    if as_path.extension().is_some_and(|e| e == CHECKPOINT_EXTENSION) {
        if !as_path.is_file() {
            return Err(AllInOneError::ModelNotFound {
                name: spec.to_string(),
                locations: format!("  - {}", as_path.display()),
            });
        }
        return Ok(Arc::new(load_checkpoint(as_path)?));
    }

    let dirs = search_dirs(model_dir);
    let names = members_of(spec)?;
    let paths = names
        .iter()
        .map(|name| find_checkpoint(name, &dirs))
        .collect::<Result<Vec<_>>>()?;

    let mut members = paths
        .par_iter()
        .map(|path| load_checkpoint(path).map(Arc::new))
        .collect::<Result<Vec<_>>>()?;

    if members.len() == 1 {
        if let Some(single) = members.pop() {
            return Ok(single);
        }
    }

    info!("Loaded ensemble '{}' with {} members", spec, members.len());
    Ok(Arc::new(Ensemble::new(spec, members)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::{small_config, tensors};
    use crate::model::weights::save_safetensors;
    use tempfile::TempDir;

    fn write_checkpoint(dir: &Path, name: &str, seed: usize) -> PathBuf {
        let config = small_config();
        let path = dir.join(format!("{name}.safetensors"));
        save_safetensors(&path, &tensors(&config, seed), ModelState::metadata(&config).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_members_of_default_ensemble() {
        let members = members_of(DEFAULT_MODEL).unwrap();
        assert_eq!(members.len(), 8);
        assert_eq!(members[0], "harmonix-fold0");
        assert_eq!(members[7], "harmonix-fold7");
        assert_eq!(members_of("harmonix-fold3").unwrap(), vec!["harmonix-fold3"]);
    }

    #[test]
    fn test_unknown_model_name_rejected() {
        for name in ["harmonix-fold8", "harmonix", "custom", ""] {
            let err = members_of(name).unwrap_err();
            assert!(matches!(err, AllInOneError::ModelNotFound { .. }), "{name}");
            assert!(err.to_string().contains("harmonix-fold7"));
        }
    }

    #[test]
    fn test_unknown_name_not_searched_even_if_file_exists() {
        let dir = TempDir::new().unwrap();
        write_checkpoint(dir.path(), "custom", 1);
        let err = load_model("custom", Some(dir.path())).err().unwrap();
        assert!(matches!(err, AllInOneError::ModelNotFound { .. }));
    }

    #[test]
    fn test_explicit_dir_searched_first() {
        let dir = TempDir::new().unwrap();
        let dirs = search_dirs(Some(dir.path()));
        assert_eq!(dirs[0], dir.path());
        assert!(dirs.contains(&PathBuf::from("./models")));
    }

    #[test]
    fn test_find_checkpoint_lists_locations_when_missing() {
        let dir = TempDir::new().unwrap();
        let err = find_checkpoint("harmonix-fold0", &[dir.path().to_path_buf()]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("harmonix-fold0.safetensors"));
        assert!(matches!(err, AllInOneError::ModelNotFound { .. }));
    }

    #[test]
    fn test_checksum_sidecar() {
        let dir = TempDir::new().unwrap();
        let path = write_checkpoint(dir.path(), "m", 1);

        // No sidecar: accepted
        assert!(verify_checksum(&path).is_ok());

        let good = sha256_file(&path).unwrap();
        fs::write(dir.path().join("m.safetensors.sha256"), format!("{}  m.safetensors\n", good)).unwrap();
        assert!(verify_checksum(&path).is_ok());

        fs::write(dir.path().join("m.safetensors.sha256"), "00ff").unwrap();
        let err = verify_checksum(&path).unwrap_err();
        assert!(matches!(err, AllInOneError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_load_single_by_name() {
        let dir = TempDir::new().unwrap();
        write_checkpoint(dir.path(), "harmonix-fold2", 1);
        let model = load_model("harmonix-fold2", Some(dir.path())).unwrap();
        assert_eq!(model.name(), "harmonix-fold2");
        assert_eq!(model.num_labels(), 4);
    }

    #[test]
    fn test_load_by_path() {
        let dir = TempDir::new().unwrap();
        let path = write_checkpoint(dir.path(), "custom", 1);
        let model = load_model(path.to_str().unwrap(), None).unwrap();
        assert_eq!(model.name(), "custom");
    }

    #[test]
    fn test_load_default_ensemble() {
        let dir = TempDir::new().unwrap();
        for i in 0..8 {
            write_checkpoint(dir.path(), &format!("harmonix-fold{i}"), i);
        }
        let model = load_model(DEFAULT_MODEL, Some(dir.path())).unwrap();
        assert_eq!(model.name(), DEFAULT_MODEL);
        assert_eq!(model.input_dim(), 6);
    }
}
