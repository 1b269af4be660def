use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::manifest::{CommandList, ExportedVar, OrderedMap};
use crate::sandbox::SourceKind;
use crate::store::StoreTier;

/// Content-derived task id: `<name>-<version>-<hash>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for TaskId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Kind of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DepKind {
  /// Needed at build time and at run time; exports propagate to dependents.
  Runtime,
  /// A build tool; exports reach the direct consumer only.
  BuildTime,
  /// Development-only; never part of any build environment.
  Dev,
}

/// Whether the root package is built for development or for release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  /// Root uses `buildDev` when declared and keeps its dev dependencies.
  #[default]
  Dev,
  /// Root is built like any other package.
  Release,
}

/// One package's build and install work.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildTask {
  pub id: TaskId,
  /// Id of the package in the lock file.
  pub pkg_id: String,
  pub name: String,
  pub version: String,
  pub source: String,
  pub source_path: PathBuf,
  pub kind: SourceKind,
  pub tier: StoreTier,
  pub is_root: bool,
  /// `build` holds the root's `buildDev` commands.
  pub build_dev: bool,
  pub build: CommandList,
  pub install: CommandList,
  pub builds_in_source: bool,
  pub build_env: OrderedMap<String>,
  pub exported_env: OrderedMap<ExportedVar>,
  pub sandbox_env: OrderedMap<String>,
}

impl BuildTask {
  pub fn label(&self) -> String {
    format!("{}@{}", self.name, self.version)
  }

  /// Sources may change between invocations, so the store entry is checked
  /// for staleness.
  pub fn is_mutable(&self) -> bool {
    self.kind.is_mutable()
  }
}
