//! Sandbox discovery.
//!
//! A sandbox is one buildable configuration of a project: the default one is
//! defined by `esy.json`/`package.json`, named ones by `<name>.json`. The
//! context is computed once at startup and threaded through every operation.

use std::path::{Path, PathBuf};

use crate::consts::{DEFAULT_MANIFESTS, DEFAULT_SANDBOX, INSTALLATION_FILE, LOCK_DIR, LOCK_INDEX, META_DIR, PROJECT_MARKER};
use crate::manifest::ManifestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxContext {
  /// Directory containing the sandbox manifest.
  pub project_root: PathBuf,
  /// The sandbox manifest itself.
  pub root_manifest_path: PathBuf,
  /// `default`, or the `<name>` of `@<name>`.
  pub sandbox_name: String,
}

impl SandboxContext {
  /// Find the sandbox manifest starting at `cwd` and walking up.
  ///
  /// The search stops at the first directory containing the manifest or a
  /// `.esyproject` marker; reaching a marker without a manifest is an error.
  pub fn discover(cwd: &Path, sandbox: Option<&str>) -> Result<Self, ManifestError> {
    let name = sandbox
      .map(|s| s.trim_start_matches('@').trim_end_matches(".json").to_string())
      .filter(|s| !s.is_empty());
    let candidates: Vec<String> = match &name {
      Some(name) => vec![format!("{name}.json")],
      None => DEFAULT_MANIFESTS.iter().map(|s| s.to_string()).collect(),
    };

    for dir in cwd.ancestors() {
      if let Some(found) = candidates.iter().map(|c| dir.join(c)).find(|p| p.is_file()) {
        let project_root = dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let file_name = found.file_name().map(PathBuf::from).unwrap_or_default();
        return Ok(Self {
          root_manifest_path: project_root.join(file_name),
          project_root,
          sandbox_name: name.unwrap_or_else(|| DEFAULT_SANDBOX.to_string()),
        });
      }
      if dir.join(PROJECT_MARKER).exists() {
        break;
      }
    }

    Err(ManifestError::SandboxNotFound {
      name: candidates.join(" or "),
      start: cwd.to_path_buf(),
    })
  }

  pub fn is_default(&self) -> bool {
    self.sandbox_name == DEFAULT_SANDBOX
  }

  /// `esy.lock/index.json` or `<name>.esy.lock/index.json`.
  pub fn lock_path(&self) -> PathBuf {
    let dir = if self.is_default() {
      LOCK_DIR.to_string()
    } else {
      format!("{}.{LOCK_DIR}", self.sandbox_name)
    };
    self.project_root.join(dir).join(LOCK_INDEX)
  }

  /// Per-sandbox scratch directory (`_esy/<name>`).
  pub fn sandbox_dir(&self) -> PathBuf {
    self.project_root.join(META_DIR).join(&self.sandbox_name)
  }

  pub fn installation_path(&self) -> PathBuf {
    self.sandbox_dir().join(INSTALLATION_FILE)
  }

  /// Root of the project-local store.
  pub fn local_store_root(&self) -> PathBuf {
    self.sandbox_dir().join("store")
  }
}
