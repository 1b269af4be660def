//! A loaded sandbox: context, configuration, task graph and stores.
//!
//! Loading installs first when the lock file is missing or was computed from
//! different dependency declarations, or when installed sources have gone.

use std::path::PathBuf;
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tracing::{debug, info};

use crate::build::{BuildOptions, Executor};
use crate::config::Config;
use crate::env::EnvComposer;
use crate::error::{Error, ResultExt};
use crate::manifest::ManifestError;
use crate::plan::{BuildMode, DepKind, TaskGraph};
use crate::platform::Platform;
use crate::sandbox::{self, Installation, LockFile, SandboxContext, Solution};
use crate::scope::{Flavor, Globals, TaskScope};
use crate::store::StoreManager;

pub struct Project {
  pub ctx: SandboxContext,
  pub config: Config,
  pub mode: BuildMode,
  pub graph: Arc<TaskGraph>,
  pub stores: StoreManager,
  pub globals: Globals,
}

impl Project {
  /// Load the sandbox, installing it first when needed.
  pub fn load(ctx: SandboxContext, config: Config, mode: BuildMode) -> Result<Self, Error> {
    let (lock, installation) = match read_install_state(&ctx)? {
      Some(state) => state,
      None => {
        info!(sandbox = %ctx.sandbox_name, "installation is out of date, installing");
        let report = sandbox::install(&ctx)?;
        (report.lock, report.installation)
      }
    };
    let solution = Solution::load(&ctx, &lock, &installation)?;
    Self::from_solution(ctx, config, mode, &solution)
  }

  pub fn from_solution(ctx: SandboxContext, config: Config, mode: BuildMode, solution: &Solution) -> Result<Self, Error> {
    let graph = TaskGraph::build(solution, mode)?;
    let stores = StoreManager::new(config.global_store_root(), ctx.local_store_root());
    let globals = Globals {
      jobs: config.build_concurrency,
      platform: Platform::current(),
    };
    debug!(tasks = graph.len(), root = %graph.root_task().id, "planned sandbox");
    Ok(Self {
      ctx,
      config,
      mode,
      graph: Arc::new(graph),
      stores,
      globals,
    })
  }

  pub fn composer(&self) -> EnvComposer<'_> {
    EnvComposer::new(&self.graph, &self.stores, &self.globals)
  }

  pub fn scope(&self, idx: NodeIndex, flavor: Flavor) -> TaskScope {
    TaskScope::new(&self.graph, &self.stores, &self.globals, idx, flavor)
  }

  /// The task named by `-p <pkg>` (`name` or `name@version`), or the root.
  pub fn select(&self, pkg: Option<&str>) -> Result<NodeIndex, Error> {
    match pkg {
      None => Ok(self.graph.root()),
      Some(query) => self
        .graph
        .find(query)
        .ok_or_else(|| ManifestError::UnknownPackage(query.to_string()).into()),
    }
  }

  pub fn build_options(&self) -> BuildOptions {
    BuildOptions {
      concurrency: self.config.build_concurrency,
      import_paths: self.config.import_paths.clone(),
      shell: self.config.shell.clone(),
      ..BuildOptions::default()
    }
  }

  /// An executor over this project's graph that maintains the dev links.
  pub fn executor(&self, options: BuildOptions) -> Executor {
    Executor::new(self.graph.clone(), self.stores.clone(), self.globals.clone(), options)
      .with_dev_links(self.ctx.project_root.clone())
  }

  /// Direct dependencies of the root, plus its dev dependencies when asked.
  pub fn root_dependencies(&self, include_dev: bool) -> Vec<NodeIndex> {
    self
      .graph
      .edges(self.graph.root())
      .into_iter()
      .filter(|(_, kind)| include_dev || *kind != DepKind::Dev)
      .map(|(dep, _)| dep)
      .collect()
  }

  /// Every task except the root.
  pub fn all_dependencies(&self) -> Vec<NodeIndex> {
    let root = self.graph.root();
    self.graph.build_order().into_iter().filter(|idx| *idx != root).collect()
  }
}

/// Lock and installation map, when both are present and current.
fn read_install_state(ctx: &SandboxContext) -> Result<Option<(LockFile, Installation)>, Error> {
  let Some(lock) = LockFile::load(&ctx.lock_path())? else {
    return Ok(None);
  };
  let manifest = sandbox::load_sandbox_manifest(&ctx.root_manifest_path)
    .frame(|| format!("reading package metadata from {}", ctx.root_manifest_path.display()))?;
  if lock.hash != sandbox::solve_hash(&manifest)? {
    debug!(path = ?ctx.lock_path(), "lock file is outdated");
    return Ok(None);
  }
  match Installation::load(&ctx.installation_path())? {
    Some(installation) if installation.is_fetched() => Ok(Some((lock, installation))),
    _ => Ok(None),
  }
}

/// What `esy status` reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
  pub is_project: bool,
  pub is_project_solved: bool,
  pub is_project_fetched: bool,
  pub is_project_ready_for_dev: bool,
  pub root_build_path: Option<PathBuf>,
  pub root_install_path: Option<PathBuf>,
  pub root_package_config_path: Option<PathBuf>,
}

impl ProjectStatus {
  /// Inspect a sandbox without installing or building anything.
  pub fn inspect(ctx: Option<&SandboxContext>, config: &Config) -> Self {
    let Some(ctx) = ctx else {
      return Self::default();
    };
    let mut status = Self {
      is_project: true,
      root_package_config_path: Some(ctx.root_manifest_path.clone()),
      ..Self::default()
    };

    let manifest = sandbox::load_sandbox_manifest(&ctx.root_manifest_path).ok();
    let lock = LockFile::load(&ctx.lock_path()).ok().flatten();
    status.is_project_solved = match (&manifest, &lock) {
      (Some(manifest), Some(lock)) => sandbox::solve_hash(manifest).is_ok_and(|hash| hash == lock.hash),
      _ => false,
    };
    let installation = Installation::load(&ctx.installation_path()).ok().flatten();
    status.is_project_fetched = status.is_project_solved && installation.as_ref().is_some_and(Installation::is_fetched);
    if !status.is_project_fetched {
      return status;
    }

    let (Some(lock), Some(installation)) = (lock, installation) else {
      return status;
    };
    let Ok(project) = Solution::load(ctx, &lock, &installation)
      .and_then(|solution| Project::from_solution(ctx.clone(), config.clone(), BuildMode::Dev, &solution))
    else {
      return status;
    };

    let root = project.graph.root_task();
    let entry = project.stores.entry(root);
    status.root_build_path = Some(entry.build_dir);
    status.root_install_path = Some(entry.install_dir);
    status.is_project_ready_for_dev = project
      .root_dependencies(true)
      .into_iter()
      .flat_map(|dep| project.graph.closure(dep, &[DepKind::Runtime, DepKind::BuildTime]))
      .all(|idx| project.stores.is_built(project.graph.task(idx)));
    status
  }
}
