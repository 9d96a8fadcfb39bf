//! Pre-separated stem providers
//!
//! Separation into bass, drums, other and vocals happens upstream (Demucs or
//! similar). These providers only locate and decode the results.

use crate::analysis::traits::StemProvider;
use crate::audio;
use crate::error::{AllInOneError, Result};
use crate::types::{Stem, StemSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Provider for feature configurations that need no stems
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStems;

impl StemProvider for NoStems {
    fn stems_for(&self, _track_path: &Path) -> Result<Option<StemSet>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Reads `<root>/<track stem>/{bass,drums,other,vocals}.wav`
///
/// This is the layout Demucs writes with `-o <root>` (minus the model-name
/// directory, which callers can include in `root`).
#[derive(Debug, Clone)]
pub struct DirectoryStems {
    root: PathBuf,
}

impl DirectoryStems {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the stems of one track
    pub fn track_dir(&self, track_path: &Path) -> PathBuf {
        let stem = track_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.root.join(stem)
    }
}

impl StemProvider for DirectoryStems {
    fn stems_for(&self, track_path: &Path) -> Result<Option<StemSet>> {
        let dir = self.track_dir(track_path);
        if !dir.is_dir() {
            debug!("No stem directory for {}", track_path.display());
            return Ok(None);
        }

        let mut stems = StemSet::new();
        for stem in Stem::ALL {
            let path = dir.join(format!("{}.wav", stem.name()));
            if !path.is_file() {
                return Err(AllInOneError::MissingStem {
                    stem: format!("{} ({})", stem.name(), path.display()),
                });
            }
            stems.insert(stem, audio::decode(&path)?);
        }

        debug!("Loaded {} stems from {}", stems.len(), dir.display());
        Ok(Some(stems))
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}
