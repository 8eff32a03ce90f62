//! File store for released binaries
//!
//! Binaries are copied verbatim into `Packs/Files/` and `Apks/Files/` below
//! the store root.

use std::path::{Path, PathBuf};
use tracing::info;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn packs_dir(&self) -> PathBuf {
        self.root.join("Packs").join("Files")
    }

    pub fn apks_dir(&self) -> PathBuf {
        self.root.join("Apks").join("Files")
    }

    /// Copy a pack binary into the store, returning the stored path
    pub fn store_pack(&self, source: &Path, name: &str) -> Result<PathBuf> {
        copy_into(&self.packs_dir(), source, name)
    }

    /// Copy an apk binary into the store, returning the stored path
    pub fn store_apk(&self, source: &Path, name: &str) -> Result<PathBuf> {
        copy_into(&self.apks_dir(), source, name)
    }
}

/// The name an artifact is stored and registered under: the override if
/// given, else the source's base name. Must be a bare file name.
pub fn artifact_name(source: &Path, name_override: Option<&str>) -> Result<String> {
    let name = match name_override {
        Some(name) => name.to_string(),
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::InputValidation(format!("{} has no file name", source.display())))?,
    };

    let is_bare = Path::new(&name).file_name().map(|n| n == name.as_str()).unwrap_or(false);
    if name.is_empty() || !is_bare {
        return Err(Error::InputValidation(format!("'{}' is not a valid artifact file name", name)));
    }
    Ok(name)
}

fn copy_into(dir: &Path, source: &Path, name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let dest = dir.join(name);
    let bytes = std::fs::copy(source, &dest)?;
    info!(bytes, "Copied {} to {}", source.display(), dest.display());
    Ok(dest)
}
