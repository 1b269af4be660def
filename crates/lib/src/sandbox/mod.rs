//! Sandboxes: discovery, overrides, lock files and local installation.

pub mod context;
pub mod install;
pub mod lock;
pub mod overrides;
pub mod solution;

use std::path::Path;

use serde::Serialize;

use crate::error::Error;
use crate::manifest::{self, ManifestError, OrderedMap, PackageManifest};
use crate::util::hash::Hashable;

pub use context::SandboxContext;
pub use install::install;
pub use lock::{InstallEntry, InstallKind, Installation, LockError, LockFile, LockNode};
pub use overrides::{Override, OverrideError, Patch};
pub use solution::{ResolvedPackage, Solution, SourceKind};

/// Load a sandbox manifest.
///
/// A sandbox file is either a manifest, or an override record
/// `{"source": "<manifest path>", "override": {...}}` wrapping one.
pub fn load_sandbox_manifest(path: &Path) -> Result<PackageManifest, Error> {
  let value = manifest::read_json(path)?;

  let (Some(source), Some(over)) = (value.get("source"), value.get("override")) else {
    return Ok(manifest::parse_manifest(path, value)?);
  };

  let source = source.as_str().ok_or_else(|| ManifestError::Parse {
    path: path.to_path_buf(),
    message: "'source' must be a string".to_string(),
  })?;
  let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
  let source_path = base_dir.join(source.trim_start_matches("path:"));
  let source_manifest = if source_path.is_dir() {
    manifest::load_package_dir(&source_path)?
  } else {
    manifest::load_manifest(&source_path)?
  };

  let over = Override::parse(over)?;
  Ok(over.apply(&source_manifest))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveInputs<'a> {
  dependencies: &'a OrderedMap<String>,
  dev_dependencies: &'a OrderedMap<String>,
  opt_dependencies: &'a OrderedMap<String>,
  build_dependencies: &'a OrderedMap<String>,
  resolutions: &'a OrderedMap<serde_json::Value>,
}

impl Hashable for SolveInputs<'_> {}

/// Hash of the root manifest fields that determine the solution.
pub fn solve_hash(manifest: &PackageManifest) -> Result<String, Error> {
  let inputs = SolveInputs {
    dependencies: &manifest.dependencies,
    dev_dependencies: &manifest.dev_dependencies,
    opt_dependencies: &manifest.opt_dependencies,
    build_dependencies: &manifest.build_dependencies,
    resolutions: &manifest.resolutions,
  };
  Ok(inputs.short_hash().map_err(std::io::Error::other)?)
}
