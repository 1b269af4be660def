//! Test fixtures for esy-lib.
//!
//! `SolutionBuilder` assembles in-memory solutions for planner and environment
//! tests; `write_file` and `write_package` lay out projects on disk for tests
//! that go through installation and the store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::manifest::{Command, EsyConfig, ExportScope, ExportedVar};
use crate::sandbox::{ResolvedPackage, Solution, SourceKind};

/// Write `content` to `dir/rel`, creating parent directories.
pub fn write_file(dir: &Path, rel: &str, content: &str) -> PathBuf {
  let path = dir.join(rel);
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(&path, content).unwrap();
  path
}

/// Write `dir/<rel>/package.json` with the given JSON body.
pub fn write_package(dir: &Path, rel: &str, json: serde_json::Value) -> PathBuf {
  let pkg_dir = dir.join(rel);
  write_file(&pkg_dir, "package.json", &serde_json::to_string_pretty(&json).unwrap());
  pkg_dir
}

/// Builds a [`Solution`] by package name. Every package is `<name>@1.0.0`,
/// immutable unless it is the root or its kind is set explicitly.
pub struct SolutionBuilder {
  root: String,
  packages: BTreeMap<String, ResolvedPackage>,
}

impl SolutionBuilder {
  pub fn new(root: &str) -> Self {
    let mut builder = Self {
      root: root.to_string(),
      packages: BTreeMap::new(),
    };
    builder.package(root).kind = SourceKind::Root;
    builder
  }

  pub fn dep(mut self, from: &str, to: &str) -> Self {
    let id = self.package(to).id.clone();
    self.package(from).dependencies.push(id);
    self
  }

  pub fn build_dep(mut self, from: &str, to: &str) -> Self {
    let id = self.package(to).id.clone();
    self.package(from).build_dependencies.push(id);
    self
  }

  pub fn dev_dep(mut self, from: &str, to: &str) -> Self {
    let id = self.package(to).id.clone();
    self.package(from).dev_dependencies.push(id);
    self
  }

  pub fn kind(mut self, name: &str, kind: SourceKind) -> Self {
    self.package(name).kind = kind;
    self
  }

  pub fn path(mut self, name: &str, path: &Path) -> Self {
    self.package(name).path = path.to_path_buf();
    self
  }

  pub fn build_cmd(mut self, name: &str, cmd: &str) -> Self {
    self.package(name).config.build.0.push(Command::Shell(cmd.to_string()));
    self
  }

  pub fn install_cmd(mut self, name: &str, cmd: &str) -> Self {
    self.package(name).config.install.0.push(Command::Shell(cmd.to_string()));
    self
  }

  pub fn in_source(mut self, name: &str) -> Self {
    self.package(name).config.builds_in_source = true;
    self
  }

  pub fn export(mut self, name: &str, var: &str, val: &str, scope: ExportScope) -> Self {
    self.package(name).config.exported_env.insert(var, ExportedVar::new(val, scope));
    self
  }

  pub fn build_env(mut self, name: &str, var: &str, val: &str) -> Self {
    self.package(name).config.build_env.insert(var, val.to_string());
    self
  }

  pub fn sandbox_env(mut self, name: &str, var: &str, val: &str) -> Self {
    self.package(name).config.sandbox_env.insert(var, val.to_string());
    self
  }

  pub fn build(self) -> Solution {
    Solution {
      root: id_of(&self.root),
      packages: self.packages.into_values().map(|p| (p.id.clone(), p)).collect(),
    }
  }

  fn package(&mut self, name: &str) -> &mut ResolvedPackage {
    self.packages.entry(name.to_string()).or_insert_with(|| ResolvedPackage {
      id: id_of(name),
      name: name.to_string(),
      version: "1.0.0".to_string(),
      source: format!("path:./{name}"),
      kind: SourceKind::Immutable,
      path: PathBuf::from("/sources").join(name),
      config: EsyConfig::default(),
      dependencies: Vec::new(),
      build_dependencies: Vec::new(),
      dev_dependencies: Vec::new(),
    })
  }
}

fn id_of(name: &str) -> String {
  format!("{name}@1.0.0@00000000")
}
