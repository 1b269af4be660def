//! Task graph construction.
//!
//! The resolved package graph is walked depth-first from the root. Every
//! package becomes one [`BuildTask`] whose id hashes its identity, its
//! configuration and the ids of its dependencies, so dependencies are always
//! planned before their consumers and identical subtrees share one node.
//!
//! Edges point from a task to its dependencies and carry a [`DepKind`]. Edge
//! insertion order is the dependency declaration order, which the environment
//! composer relies on for last-writer-wins resolution.

pub mod export;
mod types;

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::error::Error;
use crate::manifest::{CommandList, ExportedVar, OrderedMap};
use crate::sandbox::{LockError, ResolvedPackage, Solution, SourceKind};
use crate::store::StoreTier;
use crate::util::hash::Hashable;

pub use petgraph::graph::NodeIndex;
pub use types::{BuildMode, BuildTask, DepKind, TaskId};

/// A dependency cycle found while planning.
///
/// `chain` holds the traversal path from the root to the revisited package,
/// ending with the package that closed the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circular dependency: {}", format_chain(.chain))]
pub struct CircularDependencyError {
  pub chain: Vec<String>,
}

fn format_chain(chain: &[String]) -> String {
  chain
    .iter()
    .map(|label| format!("processing {label}"))
    .collect::<Vec<_>>()
    .join(" → ")
}

/// The planned DAG of build tasks.
#[derive(Debug, Clone)]
pub struct TaskGraph {
  graph: DiGraph<BuildTask, DepKind>,
  root: NodeIndex,
  by_id: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
  /// Plan the solution's root package and everything it reaches.
  pub fn build(solution: &Solution, mode: BuildMode) -> Result<Self, Error> {
    let mut planner = Planner {
      solution,
      mode,
      graph: DiGraph::new(),
      by_pkg: HashMap::new(),
      by_id: HashMap::new(),
      path: Vec::new(),
    };
    let root = planner.visit(&solution.root)?;
    debug!(tasks = planner.graph.node_count(), root = %planner.graph[root].id, "planned task graph");

    Ok(Self {
      graph: planner.graph,
      root,
      by_id: planner.by_id,
    })
  }

  pub fn root(&self) -> NodeIndex {
    self.root
  }

  pub fn root_task(&self) -> &BuildTask {
    &self.graph[self.root]
  }

  pub fn task(&self, idx: NodeIndex) -> &BuildTask {
    &self.graph[idx]
  }

  pub fn index_of(&self, id: &TaskId) -> Option<NodeIndex> {
    self.by_id.get(id).copied()
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Find a task by `name` or `name@version`.
  pub fn find(&self, query: &str) -> Option<NodeIndex> {
    self
      .build_order()
      .into_iter()
      .find(|&idx| {
        let task = &self.graph[idx];
        task.name == query || task.label() == query
      })
  }

  /// Direct dependencies with their edge kinds, in declaration order.
  pub fn edges(&self, idx: NodeIndex) -> Vec<(NodeIndex, DepKind)> {
    let mut edges: Vec<(EdgeIndex, NodeIndex, DepKind)> = self
      .graph
      .edges_directed(idx, Direction::Outgoing)
      .map(|e| (e.id(), e.target(), *e.weight()))
      .collect();
    edges.sort_by_key(|(id, _, _)| id.index());
    edges.into_iter().map(|(_, target, kind)| (target, kind)).collect()
  }

  /// Direct dependencies of one kind, in declaration order.
  pub fn dependencies(&self, idx: NodeIndex, kind: DepKind) -> Vec<NodeIndex> {
    self
      .edges(idx)
      .into_iter()
      .filter(|(_, k)| *k == kind)
      .map(|(target, _)| target)
      .collect()
  }

  /// All packages reachable through runtime edges, dependencies first.
  ///
  /// Each task appears once, at its first post-order position; `idx` itself is
  /// not included.
  pub fn transitive_runtime(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    seen.insert(idx);
    for dep in self.dependencies(idx, DepKind::Runtime) {
      self.post_order(dep, &[DepKind::Runtime], &mut seen, &mut order);
    }
    order
  }

  /// Tasks that reach `idx` through runtime edges only, root first and the
  /// nearest dependents last.
  pub fn runtime_ancestors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut ancestors = HashSet::new();
    let mut stack = vec![idx];
    while let Some(current) = stack.pop() {
      for edge in self.graph.edges_directed(current, Direction::Incoming) {
        if *edge.weight() == DepKind::Runtime && ancestors.insert(edge.source()) {
          stack.push(edge.source());
        }
      }
    }

    let mut order = self.build_order();
    order.reverse();
    order.into_iter().filter(|n| ancestors.contains(n)).collect()
  }

  /// Every task reachable from the root, dependencies before dependents.
  pub fn build_order(&self) -> Vec<NodeIndex> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    self.post_order(
      self.root,
      &[DepKind::Runtime, DepKind::BuildTime, DepKind::Dev],
      &mut seen,
      &mut order,
    );
    order
  }

  /// Tasks reachable from `idx` through the given edge kinds, dependencies
  /// first, including `idx` itself as the last element.
  pub fn closure(&self, idx: NodeIndex, kinds: &[DepKind]) -> Vec<NodeIndex> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    self.post_order(idx, kinds, &mut seen, &mut order);
    order
  }

  pub fn tasks(&self) -> impl Iterator<Item = (NodeIndex, &BuildTask)> {
    self.graph.node_indices().map(|idx| (idx, &self.graph[idx]))
  }

  fn post_order(&self, idx: NodeIndex, kinds: &[DepKind], seen: &mut HashSet<NodeIndex>, order: &mut Vec<NodeIndex>) {
    if !seen.insert(idx) {
      return;
    }
    for (dep, kind) in self.edges(idx) {
      if kinds.contains(&kind) {
        self.post_order(dep, kinds, seen, order);
      }
    }
    order.push(idx);
  }
}

struct Planner<'a> {
  solution: &'a Solution,
  mode: BuildMode,
  graph: DiGraph<BuildTask, DepKind>,
  by_pkg: HashMap<String, NodeIndex>,
  by_id: HashMap<TaskId, NodeIndex>,
  /// Package ids on the current traversal path.
  path: Vec<String>,
}

impl Planner<'_> {
  fn visit(&mut self, pkg_id: &str) -> Result<NodeIndex, Error> {
    if let Some(&idx) = self.by_pkg.get(pkg_id) {
      return Ok(idx);
    }

    let solution = self.solution;
    let pkg = solution
      .get(pkg_id)
      .ok_or_else(|| LockError::MissingNode(pkg_id.to_string()))?;

    if self.path.iter().any(|p| p == pkg_id) {
      let mut chain: Vec<String> = self.path.iter().map(|id| self.label(id)).collect();
      chain.push(pkg.label());
      return Err(CircularDependencyError { chain }.into());
    }

    self.path.push(pkg_id.to_string());
    let result = self.plan_package(pkg);
    self.path.pop();

    let idx = result.map_err(|err| match err {
      Error::Cycle(_) => err,
      other => Error::context(format!("processing {}", pkg.label()), other),
    })?;
    self.by_pkg.insert(pkg_id.to_string(), idx);
    Ok(idx)
  }

  fn plan_package(&mut self, pkg: &ResolvedPackage) -> Result<NodeIndex, Error> {
    let is_root = pkg.id == self.solution.root;
    let dev = is_root && self.mode == BuildMode::Dev;

    let mut deps: Vec<(NodeIndex, DepKind)> = Vec::new();
    for id in &pkg.dependencies {
      deps.push((self.visit(id)?, DepKind::Runtime));
    }
    for id in &pkg.build_dependencies {
      deps.push((self.visit(id)?, DepKind::BuildTime));
    }
    if dev {
      for id in &pkg.dev_dependencies {
        deps.push((self.visit(id)?, DepKind::Dev));
      }
    }

    let (build, build_dev) = match (&pkg.config.build_dev, dev) {
      (Some(build_dev), true) => (build_dev.clone(), true),
      _ => (pkg.config.build.clone(), false),
    };

    let local_dep = deps
      .iter()
      .any(|(idx, kind)| *kind != DepKind::Dev && self.graph[*idx].tier == StoreTier::Local);
    let tier = if pkg.kind.is_mutable() || local_dep {
      StoreTier::Local
    } else {
      StoreTier::Global
    };

    let mut dep_ids: Vec<(DepKind, &TaskId)> = deps.iter().map(|(idx, kind)| (*kind, &self.graph[*idx].id)).collect();
    dep_ids.sort();
    let inputs = TaskInputs {
      name: &pkg.name,
      version: &pkg.version,
      source: &pkg.source,
      kind: pkg.kind,
      is_root,
      build: &build,
      install: &pkg.config.install,
      builds_in_source: pkg.config.builds_in_source,
      build_env: &pkg.config.build_env,
      exported_env: &pkg.config.exported_env,
      sandbox_env: &pkg.config.sandbox_env,
      dependencies: dep_ids,
    };
    let hash = inputs.short_hash().map_err(std::io::Error::other)?;
    let id = TaskId(format!("{}-{}-{hash}", normalize(&pkg.name), normalize(&pkg.version)));

    if let Some(&idx) = self.by_id.get(&id) {
      return Ok(idx);
    }

    let task = BuildTask {
      id: id.clone(),
      pkg_id: pkg.id.clone(),
      name: pkg.name.clone(),
      version: pkg.version.clone(),
      source: pkg.source.clone(),
      source_path: pkg.path.clone(),
      kind: pkg.kind,
      tier,
      is_root,
      build_dev,
      build,
      install: pkg.config.install.clone(),
      builds_in_source: pkg.config.builds_in_source,
      build_env: pkg.config.build_env.clone(),
      exported_env: pkg.config.exported_env.clone(),
      sandbox_env: pkg.config.sandbox_env.clone(),
    };
    debug!(task = %task.label(), id = %id, tier = ?tier, "planned");

    let idx = self.graph.add_node(task);
    for (dep, kind) in deps {
      self.graph.add_edge(idx, dep, kind);
    }
    self.by_id.insert(id, idx);
    Ok(idx)
  }

  fn label(&self, pkg_id: &str) -> String {
    self
      .solution
      .get(pkg_id)
      .map(ResolvedPackage::label)
      .unwrap_or_else(|| pkg_id.to_string())
  }
}

/// Everything that determines a task's id.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskInputs<'a> {
  name: &'a str,
  version: &'a str,
  source: &'a str,
  kind: SourceKind,
  is_root: bool,
  build: &'a CommandList,
  install: &'a CommandList,
  builds_in_source: bool,
  build_env: &'a OrderedMap<String>,
  exported_env: &'a OrderedMap<ExportedVar>,
  sandbox_env: &'a OrderedMap<String>,
  dependencies: Vec<(DepKind, &'a TaskId)>,
}

impl Hashable for TaskInputs<'_> {}

fn normalize(part: &str) -> String {
  part
    .trim_start_matches('@')
    .chars()
    .map(|c| match c {
      '/' => '_',
      c if c.is_ascii_alphanumeric() || c == '.' || c == '_' => c,
      _ => '_',
    })
    .collect()
}
