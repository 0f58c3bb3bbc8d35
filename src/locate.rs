use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// One manifest entry: an audio file identified by name only. Where the
/// file lives inside the dataset root is resolved at locate time.
#[derive(Debug, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
}

/// Result of resolving a manifest against a dataset root.
///
/// `resolved` preserves manifest order among matches; entries whose
/// filename exists under no immediate subdirectory land in `unresolved`
/// instead of silently shrinking the dataset.
#[derive(Debug, Default)]
pub struct Resolution {
    pub resolved: Vec<PathBuf>,
    pub unresolved: Vec<String>,
}

/// Resolve every manifest entry to a path under the dataset root.
///
/// Immediate subdirectories are scanned in directory-listing order and the
/// first `subdir/filename` that exists wins. Only the manifest file itself
/// being unreadable is an error; per-entry misses are reported, not raised.
pub fn locate(manifest_path: &Path, dataset_root: &Path) -> Result<Resolution> {
    let data = fs::read_to_string(manifest_path)
        .with_context(|| format!("failed to read manifest {}", manifest_path.display()))?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&data)
        .with_context(|| format!("invalid manifest {}", manifest_path.display()))?;

    let subdirs = category_dirs(dataset_root)?;

    let mut resolution = Resolution::default();
    for entry in entries {
        match resolve_entry(&entry.filename, &subdirs) {
            Some(path) => resolution.resolved.push(path),
            None => resolution.unresolved.push(entry.filename),
        }
    }

    Ok(resolution)
}

/// Immediate subdirectories of the dataset root, in directory-listing order.
fn category_dirs(dataset_root: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = fs::read_dir(dataset_root)
        .with_context(|| format!("failed to read dataset root {}", dataset_root.display()))?;

    let mut dirs = Vec::new();
    for dir_entry in read_dir {
        let path = dir_entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn resolve_entry(filename: &str, subdirs: &[PathBuf]) -> Option<PathBuf> {
    subdirs.iter().find_map(|dir| {
        let candidate = dir.join(filename);
        candidate.is_file().then_some(candidate)
    })
}
