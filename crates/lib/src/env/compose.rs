//! Build, command and exec environments.
//!
//! Variables are written in a fixed order and the last writer wins:
//!
//! 1. built-ins: `cur__*`, `PATH`, `MAN_PATH`, `OCAMLPATH`,
//!    `CAML_LD_LIBRARY_PATH`, `OCAMLFIND_DESTDIR`, `OCAMLFIND_LDCONF`
//! 2. global exports of transitive runtime dependencies, dependencies first
//! 3. local exports of direct runtime dependencies, in declaration order
//! 4. exports of direct build-time dependencies (both scopes)
//! 5. for a dev-mode root built with `buildDev`: exports of direct dev
//!    dependencies (both scopes)
//! 6. the task's own `buildEnv`
//!
//! The command environment continues with exports of dev dependencies
//! (globals transitively, locals direct), the `sandboxEnv` of runtime
//! ancestors (root first), the task's own `sandboxEnv`, and the caller's
//! `PATH`. The exec environment adds the task's own `bin` and `man` dirs.
//!
//! Every value is expanded with `#{}`/`%{}%` placeholders against the scope
//! of the package that declared it, then `$NAME` references against the
//! variables written so far.

use std::collections::HashSet;

use petgraph::graph::NodeIndex;

use super::{BUILTIN_ORIGIN, Environment};
use crate::consts::SYSTEM_PATH;
use crate::error::Error;
use crate::manifest::ExportScope;
use crate::plan::{DepKind, TaskGraph};
use crate::scope::{Flavor, Globals, PackageScope, TaskScope};
use crate::store::StoreManager;

pub struct EnvComposer<'a> {
  graph: &'a TaskGraph,
  stores: &'a StoreManager,
  globals: &'a Globals,
}

impl<'a> EnvComposer<'a> {
  pub fn new(graph: &'a TaskGraph, stores: &'a StoreManager, globals: &'a Globals) -> Self {
    Self { graph, stores, globals }
  }

  /// Environment the task's build and install commands run in.
  pub fn build_env(&self, idx: NodeIndex) -> Result<Environment, Error> {
    self.compose_build(idx, Flavor::Building)
  }

  /// Environment for running development commands in the task's sandbox.
  pub fn command_env(&self, idx: NodeIndex) -> Result<Environment, Error> {
    let mut env = self.compose_build(idx, Flavor::Final)?;
    let task = self.graph.task(idx);

    let dev_deps = self.graph.dependencies(idx, DepKind::Dev);
    let mut seen = HashSet::new();
    for &dev in &dev_deps {
      for dep in self.graph.closure(dev, &[DepKind::Runtime]) {
        if seen.insert(dep) {
          self.add_exports(&mut env, dep, Some(ExportScope::Global))?;
        }
      }
    }
    for &dev in &dev_deps {
      self.add_exports(&mut env, dev, Some(ExportScope::Local))?;
    }

    for ancestor in self.graph.runtime_ancestors(idx) {
      self.add_sandbox_env(&mut env, ancestor)?;
    }
    self.add_sandbox_env(&mut env, idx)?;

    let mut path: Vec<String> = Vec::new();
    for &dev in &dev_deps {
      for dep in self.graph.closure(dev, &[DepKind::Runtime]).into_iter().rev() {
        path.push(self.final_scope(dep).field("bin").unwrap_or_default());
      }
    }
    path.extend(env.get("PATH").map(str::to_string));
    path.extend(std::env::var("PATH").ok().filter(|p| !p.is_empty()));
    env.set("PATH", path.join(":"), BUILTIN_ORIGIN);

    tracing::debug!(task = %task.label(), vars = env.len(), "composed command environment");
    Ok(env)
  }

  /// Command environment plus the task's own installed executables.
  pub fn exec_env(&self, idx: NodeIndex) -> Result<Environment, Error> {
    let mut env = self.command_env(idx)?;
    let this = self.final_scope(idx);
    for (var, field) in [("PATH", "bin"), ("MAN_PATH", "man")] {
      let own = this.field(field).unwrap_or_default();
      let value = match env.get(var).filter(|v| !v.is_empty()) {
        Some(rest) => format!("{own}:{rest}"),
        None => own,
      };
      env.set(var, value, BUILTIN_ORIGIN);
    }
    Ok(env)
  }

  fn compose_build(&self, idx: NodeIndex, flavor: Flavor) -> Result<Environment, Error> {
    let task = self.graph.task(idx);
    let scope = TaskScope::new(self.graph, self.stores, self.globals, idx, flavor);
    let mut env = Environment::new();

    self.add_builtins(&mut env, idx, &scope.this);

    for dep in self.graph.transitive_runtime(idx) {
      self.add_exports(&mut env, dep, Some(ExportScope::Global))?;
    }
    for dep in self.graph.dependencies(idx, DepKind::Runtime) {
      self.add_exports(&mut env, dep, Some(ExportScope::Local))?;
    }
    for dep in self.graph.dependencies(idx, DepKind::BuildTime) {
      self.add_exports(&mut env, dep, None)?;
    }
    if task.is_root && task.build_dev {
      for dep in self.graph.dependencies(idx, DepKind::Dev) {
        self.add_exports(&mut env, dep, None)?;
      }
    }

    let origin = format!("{}__buildEnv", task.name);
    for (name, value) in task.build_env.iter() {
      let rendered = scope.render(value)?;
      let value = env.expand(&rendered);
      env.set(name, value, origin.as_str());
    }
    Ok(env)
  }

  /// Packages whose installs are visible while building `idx`: transitive
  /// runtime dependencies and build-time tools with their runtime closure,
  /// nearest first.
  fn visible(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for dep in self.graph.transitive_runtime(idx) {
      if seen.insert(dep) {
        order.push(dep);
      }
    }
    for tool in self.graph.dependencies(idx, DepKind::BuildTime) {
      for dep in self.graph.closure(tool, &[DepKind::Runtime]) {
        if seen.insert(dep) {
          order.push(dep);
        }
      }
    }
    order.reverse();
    order
  }

  fn add_builtins(&self, env: &mut Environment, idx: NodeIndex, this: &PackageScope) {
    for (field, value) in this.fields() {
      env.set(format!("cur__{field}"), value, BUILTIN_ORIGIN);
    }

    let deps: Vec<PackageScope> = self.visible(idx).into_iter().map(|d| self.final_scope(d)).collect();
    let joined = |field: &str| {
      deps
        .iter()
        .filter_map(|d| d.field(field))
        .collect::<Vec<_>>()
        .join(":")
    };

    let mut path = joined("bin");
    if !path.is_empty() {
      path.push(':');
    }
    path.push_str(SYSTEM_PATH);
    env.set("PATH", path, BUILTIN_ORIGIN);
    env.set("MAN_PATH", joined("man"), BUILTIN_ORIGIN);
    env.set("OCAMLPATH", joined("lib"), BUILTIN_ORIGIN);
    env.set("CAML_LD_LIBRARY_PATH", joined("stublibs"), BUILTIN_ORIGIN);
    env.set("OCAMLFIND_DESTDIR", this.field("lib").unwrap_or_default(), BUILTIN_ORIGIN);
    env.set("OCAMLFIND_LDCONF", "ignore", BUILTIN_ORIGIN);
  }

  /// Add the exports of `dep`, restricted to one scope when given.
  fn add_exports(&self, env: &mut Environment, dep: NodeIndex, only: Option<ExportScope>) -> Result<(), Error> {
    let task = self.graph.task(dep);
    if task.exported_env.is_empty() {
      return Ok(());
    }
    let scope = TaskScope::new(self.graph, self.stores, self.globals, dep, Flavor::Final);
    for (name, var) in task.exported_env.iter() {
      if only.is_some_and(|s| s != var.scope) {
        continue;
      }
      let origin = match var.scope {
        ExportScope::Local => format!("{}__local", task.name),
        ExportScope::Global => format!("{}__global", task.name),
      };
      let rendered = scope.render(&var.val)?;
      let value = env.expand(&rendered);
      env.set(name, value, origin);
    }
    Ok(())
  }

  fn add_sandbox_env(&self, env: &mut Environment, idx: NodeIndex) -> Result<(), Error> {
    let task = self.graph.task(idx);
    if task.sandbox_env.is_empty() {
      return Ok(());
    }
    let scope = TaskScope::new(self.graph, self.stores, self.globals, idx, Flavor::Final);
    let origin = format!("{}__sandboxEnv", task.name);
    for (name, value) in task.sandbox_env.iter() {
      let rendered = scope.render(value)?;
      let value = env.expand(&rendered);
      env.set(name, value, origin.as_str());
    }
    Ok(())
  }

  fn final_scope(&self, idx: NodeIndex) -> PackageScope {
    PackageScope::new(self.graph.task(idx), self.stores, Flavor::Final)
  }
}
