//! Package manifests.
//!
//! Reading `package.json` / `esy.json` files into [`PackageManifest`] values.
//! Parsing is purely structural; semantic checks happen in the planner.

mod ordered;
mod types;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::DEFAULT_MANIFESTS;

pub use ordered::OrderedMap;
pub use types::*;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("manifest not found: {}", .0.display())]
  NotFound(PathBuf),

  #[error("failed to read manifest {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid manifest {}: {message}", .path.display())]
  Parse { path: PathBuf, message: String },

  #[error("no sandbox configuration '{name}' found in {} or its parent directories", .start.display())]
  SandboxNotFound { name: String, start: PathBuf },

  #[error("cannot resolve {name}@{spec}: {reason}")]
  Unresolved { name: String, spec: String, reason: String },

  #[error("invalid resolution for {name}: {message}")]
  InvalidResolution { name: String, message: String },

  #[error("package {0} is not part of the sandbox")]
  UnknownPackage(String),
}

/// Read and parse a manifest file.
pub fn load_manifest(path: &Path) -> Result<PackageManifest, ManifestError> {
  let value = read_json(path)?;
  parse_manifest(path, value)
}

/// Parse an already-read JSON value as a manifest.
pub fn parse_manifest(path: &Path, value: serde_json::Value) -> Result<PackageManifest, ManifestError> {
  serde_json::from_value(value).map_err(|e| ManifestError::Parse {
    path: path.to_path_buf(),
    message: e.to_string(),
  })
}

/// Read a JSON file, mapping a missing file to [`ManifestError::NotFound`].
pub fn read_json(path: &Path) -> Result<serde_json::Value, ManifestError> {
  let content = std::fs::read_to_string(path).map_err(|source| match source.kind() {
    io::ErrorKind::NotFound => ManifestError::NotFound(path.to_path_buf()),
    _ => ManifestError::Read {
      path: path.to_path_buf(),
      source,
    },
  })?;
  serde_json::from_str(&content).map_err(|e| ManifestError::Parse {
    path: path.to_path_buf(),
    message: e.to_string(),
  })
}

/// Locate the manifest of a package directory (`esy.json` before `package.json`).
pub fn find_manifest(dir: &Path) -> Option<PathBuf> {
  DEFAULT_MANIFESTS
    .iter()
    .map(|name| dir.join(name))
    .find(|candidate| candidate.is_file())
}

/// Load the manifest of a package directory; a directory without one yields
/// an empty manifest.
pub fn load_package_dir(dir: &Path) -> Result<PackageManifest, ManifestError> {
  match find_manifest(dir) {
    Some(path) => load_manifest(&path),
    None => Ok(PackageManifest::default()),
  }
}
