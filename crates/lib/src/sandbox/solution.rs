//! The resolved package graph.
//!
//! A [`Solution`] is what the planner consumes: every package with its merged
//! configuration and its dependency ids in declaration order. It is loaded
//! from the lock file plus installation map, or built directly by callers that
//! already hold a resolved graph.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ResultExt};
use crate::manifest::{self, EsyConfig};
use crate::sandbox::context::SandboxContext;
use crate::sandbox::load_sandbox_manifest;
use crate::sandbox::lock::{InstallKind, Installation, LockFile};

/// How a package's sources may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
  /// The sandbox's own package, under active development.
  Root,
  /// A linked source tree that may change between builds.
  Linked,
  /// An immutable source; never stale once built.
  Immutable,
}

impl SourceKind {
  pub fn is_mutable(self) -> bool {
    !matches!(self, SourceKind::Immutable)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPackage {
  pub id: String,
  pub name: String,
  pub version: String,
  pub source: String,
  pub kind: SourceKind,
  /// Directory holding the package sources.
  pub path: PathBuf,
  /// The `esy` section after overrides.
  pub config: EsyConfig,
  pub dependencies: Vec<String>,
  pub build_dependencies: Vec<String>,
  pub dev_dependencies: Vec<String>,
}

impl ResolvedPackage {
  pub fn label(&self) -> String {
    format!("{}@{}", self.name, self.version)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
  pub root: String,
  pub packages: BTreeMap<String, ResolvedPackage>,
}

impl Solution {
  pub fn get(&self, id: &str) -> Option<&ResolvedPackage> {
    self.packages.get(id)
  }

  pub fn root_package(&self) -> Option<&ResolvedPackage> {
    self.packages.get(&self.root)
  }

  /// Load every lock node, reading manifests from the installed source paths
  /// and applying the override recorded in the lock.
  pub fn load(ctx: &SandboxContext, lock: &LockFile, installation: &Installation) -> Result<Self, Error> {
    let mut packages = BTreeMap::new();

    for (id, node) in &lock.node {
      let is_root = *id == lock.root;
      let (kind, path, manifest) = if is_root {
        let manifest = load_sandbox_manifest(&ctx.root_manifest_path)
          .frame(|| format!("reading package metadata from {}", ctx.root_manifest_path.display()))?;
        (SourceKind::Root, ctx.project_root.clone(), manifest)
      } else {
        let entry = installation.get(id)?;
        let manifest =
          manifest::load_package_dir(&entry.path).frame(|| format!("reading package metadata from {}", node.source))?;
        let manifest = match &node.override_ {
          Some(over) => over.apply(&manifest),
          None => manifest,
        };
        let kind = match entry.kind {
          InstallKind::Link => SourceKind::Linked,
          InstallKind::Install => SourceKind::Immutable,
        };
        (kind, entry.path.clone(), manifest)
      };

      packages.insert(
        id.clone(),
        ResolvedPackage {
          id: id.clone(),
          name: node.name.clone(),
          version: node.version.clone(),
          source: node.source.clone(),
          kind,
          path,
          config: manifest.esy_config(),
          dependencies: node.dependencies.clone(),
          build_dependencies: node.build_dependencies.clone(),
          dev_dependencies: node.dev_dependencies.clone(),
        },
      );
    }

    if !packages.contains_key(&lock.root) {
      return Err(crate::sandbox::lock::LockError::MissingNode(lock.root.clone()).into());
    }

    Ok(Self {
      root: lock.root.clone(),
      packages,
    })
  }
}
