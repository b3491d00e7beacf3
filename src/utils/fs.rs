//! Lazy directory walkers, usable as chain sources.

use crate::utils::error::{ChainError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

fn walk(root: &Path) -> impl Iterator<Item = Result<DirEntry>> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map_err(ChainError::upstream))
}

/// Every regular file below `root`, depth first, in file-name order within
/// each directory.
pub fn walk_files<P: AsRef<Path>>(root: P) -> impl Iterator<Item = Result<PathBuf>> {
    walk(root.as_ref()).filter_map(|entry| match entry {
        Ok(entry) if entry.file_type().is_file() => Some(Ok(entry.into_path())),
        Ok(_) => None,
        Err(err) => Some(Err(err)),
    })
}

/// Directories below `root` (including `root` itself) that contain no
/// subdirectories.
pub fn walk_leaf_dirs<P: AsRef<Path>>(root: P) -> impl Iterator<Item = Result<PathBuf>> {
    walk(root.as_ref()).filter_map(|entry| {
        let entry = match entry {
            Ok(entry) if entry.file_type().is_dir() => entry,
            Ok(_) => return None,
            Err(err) => return Some(Err(err)),
        };
        match has_subdirectory(entry.path()) {
            Ok(true) => None,
            Ok(false) => Some(Ok(entry.into_path())),
            Err(err) => Some(Err(err)),
        }
    })
}

fn has_subdirectory(dir: &Path) -> Result<bool> {
    for child in fs::read_dir(dir).map_err(ChainError::upstream)? {
        let child = child.map_err(ChainError::upstream)?;
        if child.file_type().map_err(ChainError::upstream)?.is_dir() {
            return Ok(true);
        }
    }
    Ok(false)
}
