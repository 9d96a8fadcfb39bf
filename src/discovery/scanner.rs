//! File discovery and scanning

use crate::error::{AllInOneError, Result};
use crate::types::AudioFormat;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Discovered audio file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiscoveredFile {
    pub path: PathBuf,
}

impl DiscoveredFile {
    /// File name without extension, used to name result files
    pub fn track_name(&self) -> String {
        track_name(&self.path)
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(AudioFormat::from_extension)
    }
}

/// Name under which results for `path` are written
pub fn track_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "track".to_string())
}

/// Scan a path (file or directory) for audio files
///
/// A file given explicitly must have a supported extension. Directory entries
/// with other extensions are ignored. Results are sorted by path.
pub fn scan(input: &Path, recursive: bool) -> Result<Vec<DiscoveredFile>> {
    if !input.exists() {
        return Err(AllInOneError::FileNotFound(input.to_path_buf()));
    }

    let mut files = BTreeSet::new();

    if input.is_file() {
        if !AudioFormat::is_supported_path(input) {
            return Err(AllInOneError::UnsupportedFormat {
                path: input.to_path_buf(),
                format: input
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }
        files.insert(DiscoveredFile {
            path: input.to_path_buf(),
        });
    } else {
        let walker = if recursive {
            WalkDir::new(input)
        } else {
            WalkDir::new(input).max_depth(1)
        };

        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_type().is_file() && AudioFormat::is_supported_path(path) {
                debug!("Discovered: {}", path.display());
                files.insert(DiscoveredFile {
                    path: path.to_path_buf(),
                });
            }
        }

        if files.is_empty() {
            warn!("No supported audio files found in {}", input.display());
        }
    }

    Ok(files.into_iter().collect())
}

/// Scan several inputs, dropping duplicates
pub fn scan_all(inputs: &[PathBuf], recursive: bool) -> Result<Vec<DiscoveredFile>> {
    let mut files = BTreeSet::new();
    for input in inputs {
        files.extend(scan(input, recursive)?);
    }
    info!("Discovered {} audio files", files.len());
    Ok(files.into_iter().collect())
}
