//! Build execution.
//!
//! The executor realizes tasks of a [`TaskGraph`] in its stores. Each task id
//! is realized at most once per executor: the first request creates a shared
//! cell and runs the task, later requests await the same cell and observe the
//! same result or error.
//!
//! For one task:
//! 1. realize all non-dev dependencies concurrently
//! 2. skip when the store entry is up to date and no local dependency was
//!    rebuilt in this run
//! 3. import from an export on an import path, if one exists
//! 4. wait for a concurrency permit, bail out if another task failed
//! 5. prepare the build and stage dirs, run the build then install commands
//! 6. commit the stage dir into `i/<id>`
//!
//! A failed command stops new tasks from starting. Tasks already running
//! finish and stay committed.

mod cmd;
mod types;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use petgraph::graph::NodeIndex;
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, warn};

use crate::consts::{BUILD_LINK, INSTALL_LINK, META_DIR, SOURCE_IGNORE};
use crate::error::{Error, ResultExt};
use crate::plan::export::BuildPlan;
use crate::plan::{DepKind, TaskGraph, TaskId};
use crate::scope::Globals;
use crate::store::{Check, EntryState, StoreError, StoreManager, StoreTier, archive};
use crate::util::fs::{copy_tree, remove_path, replace_symlink};

pub use cmd::{CommandContext, log_tail, run_command};
pub use types::{BuildError, BuildOptions, BuildReport, Outcome, TaskResult};

type Shared = Result<TaskResult, Arc<Error>>;
type TaskFuture = Pin<Box<dyn Future<Output = Shared> + Send>>;

/// Realizes tasks of one task graph.
pub struct Executor {
  inner: Arc<Inner>,
}

struct Inner {
  graph: Arc<TaskGraph>,
  stores: StoreManager,
  globals: Globals,
  options: BuildOptions,
  /// Project root receiving `_esybuild`/`_esyinstall` links for the root task.
  dev_links: Option<PathBuf>,
  cells: Mutex<HashMap<TaskId, Arc<OnceCell<Shared>>>>,
  permits: Semaphore,
  aborted: AtomicBool,
}

impl Executor {
  pub fn new(graph: Arc<TaskGraph>, stores: StoreManager, globals: Globals, options: BuildOptions) -> Self {
    let permits = Semaphore::new(options.concurrency.max(1));
    Self {
      inner: Arc::new(Inner {
        graph,
        stores,
        globals,
        options,
        dev_links: None,
        cells: Mutex::new(HashMap::new()),
        permits,
        aborted: AtomicBool::new(false),
      }),
    }
  }

  /// Link the root task's build and install dirs into `project_root`.
  pub fn with_dev_links(mut self, project_root: impl Into<PathBuf>) -> Self {
    if let Some(inner) = Arc::get_mut(&mut self.inner) {
      inner.dev_links = Some(project_root.into());
    }
    self
  }

  pub fn graph(&self) -> &TaskGraph {
    &self.inner.graph
  }

  /// Realize `targets` and everything they depend on.
  ///
  /// Returns the first failure that is not a cancellation caused by it.
  pub async fn build(&self, targets: &[NodeIndex]) -> Result<BuildReport, Error> {
    debug!(targets = targets.len(), tasks = self.inner.graph.len(), "starting build execution");

    let mut set = JoinSet::new();
    for idx in unique(targets.iter().copied()) {
      set.spawn(ensure(self.inner.clone(), idx).in_current_span());
    }
    if let Some(err) = drain(set).await.1 {
      return Err(Error::Shared(err));
    }

    let report = self.report().await;
    debug!(
      built = report.built.len(),
      cached = report.cached.len(),
      imported = report.imported.len(),
      "build execution complete"
    );
    Ok(report)
  }

  /// Realize the root task.
  pub async fn build_root(&self) -> Result<BuildReport, Error> {
    let root = self.inner.graph.root();
    self.build(&[root]).await
  }

  async fn report(&self) -> BuildReport {
    let cells = self.inner.cells.lock().await;
    let mut report = BuildReport::default();
    for idx in self.inner.graph.build_order() {
      let id = &self.inner.graph.task(idx).id;
      if let Some(Ok(result)) = cells.get(id).and_then(|cell| cell.get()) {
        report.record(result);
      }
    }
    report
  }
}

fn unique(indices: impl Iterator<Item = NodeIndex>) -> Vec<NodeIndex> {
  let mut seen = HashSet::new();
  indices.filter(|idx| seen.insert(*idx)).collect()
}

/// Await every spawned task. Results come back in completion order; the
/// reported failure prefers a real error over a cancellation.
async fn drain(mut set: JoinSet<Shared>) -> (Vec<TaskResult>, Option<Arc<Error>>) {
  let mut results = Vec::new();
  let mut failure: Option<Arc<Error>> = None;

  while let Some(joined) = set.join_next().await {
    let err = match joined {
      Ok(Ok(result)) => {
        results.push(result);
        continue;
      }
      Ok(Err(err)) => err,
      Err(join_err) => Arc::new(Error::from(BuildError::Internal {
        message: join_err.to_string(),
      })),
    };
    let replace = match &failure {
      None => true,
      Some(current) => current.is_cancelled() && !err.is_cancelled(),
    };
    if replace {
      failure = Some(err);
    }
  }
  (results, failure)
}

/// Realize the task at `idx`, sharing the work with concurrent requests.
fn ensure(inner: Arc<Inner>, idx: NodeIndex) -> TaskFuture {
  Box::pin(async move {
    let id = inner.graph.task(idx).id.clone();
    let cell = inner.cells.lock().await.entry(id).or_default().clone();
    cell.get_or_init(|| realize(inner.clone(), idx)).await.clone()
  })
}

async fn realize(inner: Arc<Inner>, idx: NodeIndex) -> Shared {
  let label = inner.graph.task(idx).label();
  let result = realize_task(&inner, idx).await.frame(|| format!("building {label}"));
  if let Err(err) = &result
    && !err.is_cancelled()
    && !inner.aborted.swap(true, Ordering::SeqCst)
  {
    warn!(task = %label, "build failed, no further tasks will be started");
  }
  result.map_err(Arc::new)
}

async fn realize_task(inner: &Arc<Inner>, idx: NodeIndex) -> Result<TaskResult, Error> {
  let graph = &inner.graph;
  let task = graph.task(idx);

  let deps = unique(
    graph
      .edges(idx)
      .into_iter()
      .filter(|(_, kind)| *kind != DepKind::Dev)
      .map(|(dep, _)| dep),
  );
  let mut set = JoinSet::new();
  for dep in deps {
    set.spawn(ensure(inner.clone(), dep).in_current_span());
  }
  let (dep_results, failure) = drain(set).await;
  if let Some(err) = failure {
    return Err(Error::Shared(err));
  }

  let forced_by = dep_results
    .iter()
    .find(|r| r.outcome == Outcome::Built && r.tier == StoreTier::Local)
    .map(|r| r.id.clone());
  let skip_check = inner.options.skip_staleness_check && task.is_mutable();
  let forced = forced_by.is_some() || skip_check || (inner.options.force_local && task.is_mutable());

  let check = if skip_check {
    Check {
      state: if inner.stores.is_built(task) {
        EntryState::Stale
      } else {
        EntryState::Absent
      },
      fingerprint: None,
    }
  } else {
    let blocking = inner.clone();
    tokio::task::spawn_blocking(move || blocking.stores.check(blocking.graph.task(idx)))
      .await
      .map_err(|e| BuildError::Internal { message: e.to_string() })??
  };

  let entry = inner.stores.entry(task);
  if check.state == EntryState::Built && !forced {
    debug!(task = %task.label(), id = %task.id, "up to date");
    inner.link_root(idx);
    return Ok(TaskResult {
      id: task.id.clone(),
      tier: task.tier,
      outcome: Outcome::Cached,
      install_dir: entry.install_dir,
    });
  }

  if check.state == EntryState::Absent && !task.is_mutable() && inner.try_import(idx)? {
    return Ok(TaskResult {
      id: task.id.clone(),
      tier: task.tier,
      outcome: Outcome::Imported,
      install_dir: entry.install_dir,
    });
  }

  let _permit = inner.permits.acquire().await.map_err(|_| BuildError::Cancelled)?;
  if inner.aborted.load(Ordering::SeqCst) {
    return Err(BuildError::Cancelled.into());
  }

  let label = task.label();
  info!(id = %task.id, forced_by = ?forced_by, "building {label}");

  let fingerprint = match check.fingerprint {
    Some(fingerprint) => Some(fingerprint),
    None if task.is_mutable() => Some(inner.stores.fingerprint(task)?),
    None => None,
  };

  let plan = BuildPlan::render(graph, &inner.stores, &inner.globals, idx)?;
  let entry = inner.stores.prepare(task)?;
  if task.builds_in_source {
    copy_tree(&task.source_path, &entry.build_dir, SOURCE_IGNORE).map_err(|source| StoreError::Io {
      path: entry.build_dir.clone(),
      source,
    })?;
  }
  remove_path(&entry.log_path)?;
  let meta = entry.build_dir.join(META_DIR);
  std::fs::create_dir_all(&meta)?;
  std::fs::write(meta.join("env"), plan.env.render_shell())?;

  let env = plan.env.to_pairs();
  let tmp_dir = meta.join("tmp");
  let ctx = CommandContext {
    task: &label,
    env: &env,
    cwd: &plan.root_path,
    tmp_dir: &tmp_dir,
    log_path: &entry.log_path,
    shell: inner.options.shell.as_deref(),
  };
  for command in plan.build.iter().chain(plan.install.iter()) {
    run_command(command, &ctx).await?;
  }

  let install_dir = inner.stores.commit(task, fingerprint.as_ref())?;
  info!(id = %task.id, install = ?install_dir, "built {label}");
  inner.link_root(idx);

  Ok(TaskResult {
    id: task.id.clone(),
    tier: task.tier,
    outcome: Outcome::Built,
    install_dir,
  })
}

impl Inner {
  /// Import the task from the first import path holding an export of it.
  fn try_import(&self, idx: NodeIndex) -> Result<bool, Error> {
    let task = self.graph.task(idx);
    let Some(path) = self
      .options
      .import_paths
      .iter()
      .find_map(|dir| archive::find_export(dir, &task.id))
    else {
      return Ok(false);
    };
    archive::import(self.stores.store(task.tier), &path)?;
    info!(id = %task.id, path = ?path, "imported {}", task.label());
    Ok(true)
  }

  fn link_root(&self, idx: NodeIndex) {
    let Some(project_root) = &self.dev_links else {
      return;
    };
    if idx != self.graph.root() {
      return;
    }
    let entry = self.stores.entry(self.graph.task(idx));
    for (target, name) in [(&entry.build_dir, BUILD_LINK), (&entry.install_dir, INSTALL_LINK)] {
      let link = project_root.join(name);
      if let Err(e) = replace_symlink(target, &link) {
        warn!(link = ?link, error = %e, "failed to update dev link");
      }
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use std::path::Path;

  use super::*;
  use crate::consts::CHECKSUM_FILE;
  use crate::plan::BuildMode;
  use crate::platform::Platform;
  use crate::sandbox::SourceKind;
  use crate::store::read_meta;
  use crate::util::testutil::{SolutionBuilder, write_file};
  use tempfile::TempDir;
  use tracing_test::traced_test;

  struct Fixture {
    temp: TempDir,
  }

  impl Fixture {
    fn new() -> Self {
      Self {
        temp: TempDir::new().unwrap(),
      }
    }

    fn path(&self) -> &Path {
      self.temp.path()
    }

    /// Create a source dir for `name` and register it with the builder.
    fn source(&self, builder: SolutionBuilder, name: &str) -> SolutionBuilder {
      let dir = self.path().join("src").join(name);
      write_file(&dir, "README", name);
      builder.path(name, &dir)
    }

    fn stores(&self) -> StoreManager {
      StoreManager::new(self.path().join("global"), self.path().join("local"))
    }

    fn executor(&self, builder: SolutionBuilder, options: BuildOptions) -> Executor {
      let graph = TaskGraph::build(&builder.build(), BuildMode::Dev).unwrap();
      let globals = Globals {
        jobs: 2,
        platform: Platform::current(),
      };
      Executor::new(Arc::new(graph), self.stores(), globals, options)
    }
  }

  fn options() -> BuildOptions {
    BuildOptions {
      concurrency: 4,
      ..BuildOptions::default()
    }
  }

  fn chain(f: &Fixture) -> SolutionBuilder {
    let builder = SolutionBuilder::new("app")
      .dep("app", "lib")
      .build_cmd("lib", "echo lib > #{self.share}/marker")
      .install_cmd("lib", "cp README #{self.doc}/README")
      .build_cmd("app", "cat #{lib.share}/marker > #{self.share}/from-lib");
    let builder = f.source(builder, "lib");
    f.source(builder, "app")
  }

  // ==========================================================================
  // Scheduling
  // ==========================================================================

  #[tokio::test]
  #[traced_test]
  async fn builds_dependencies_first_and_commits() {
    let f = Fixture::new();
    let executor = f.executor(chain(&f), options());

    let report = executor.build_root().await.unwrap();
    assert_eq!(report.built.len(), 2);
    assert!(logs_contain("building lib@1.0.0"));
    assert!(logs_contain("building app@1.0.0"));

    let graph = executor.graph();
    let app = f.stores().entry(graph.root_task());
    assert_eq!(std::fs::read_to_string(app.install_dir.join("share/from-lib")).unwrap(), "lib\n");
    assert!(!app.stage_dir.exists());
    assert!(read_meta(&app.install_dir, CHECKSUM_FILE).is_some());

    let lib = f.stores().entry(graph.task(graph.find("lib").unwrap()));
    assert!(lib.install_dir.join("doc/README").is_file());
    assert!(lib.install_dir.starts_with(f.path().join("global")));
  }

  #[tokio::test]
  async fn second_run_builds_nothing() {
    let f = Fixture::new();
    f.executor(chain(&f), options()).build_root().await.unwrap();

    let report = f.executor(chain(&f), options()).build_root().await.unwrap();
    assert!(report.built.is_empty());
    assert_eq!(report.cached.len(), 2);
  }

  #[tokio::test]
  async fn shared_dependency_runs_once() {
    let f = Fixture::new();
    let counter = f.path().join("count");
    let builder = SolutionBuilder::new("app")
      .dep("app", "left")
      .dep("app", "right")
      .dep("left", "base")
      .dep("right", "base")
      .build_cmd("base", &format!("echo run >> {}", counter.display()));
    let builder = ["app", "left", "right", "base"]
      .into_iter()
      .fold(builder, |b, name| f.source(b, name));

    let report = f.executor(builder, options()).build_root().await.unwrap();
    assert_eq!(report.built.len(), 4);
    assert_eq!(std::fs::read_to_string(&counter).unwrap(), "run\n");
  }

  #[tokio::test]
  async fn dev_dependencies_are_not_built() {
    let f = Fixture::new();
    let builder = f.source(SolutionBuilder::new("app").dev_dep("app", "tool"), "app");

    let report = f.executor(builder, options()).build_root().await.unwrap();
    assert_eq!(report.built.len(), 1);
  }

  // ==========================================================================
  // Failures
  // ==========================================================================

  #[tokio::test]
  async fn failure_carries_frames_and_skips_dependents() {
    let f = Fixture::new();
    let builder = SolutionBuilder::new("app")
      .dep("app", "bad")
      .build_cmd("bad", "echo compiling; exit 2");
    let builder = f.source(f.source(builder, "bad"), "app");
    let executor = f.executor(builder, options());

    let err = executor.build_root().await.unwrap_err();
    assert_eq!(err.frames(), vec!["building app@1.0.0", "building bad@1.0.0"]);
    match err.as_build_error() {
      Some(BuildError::CommandFailed {
        command,
        exit_code,
        log_tail,
        ..
      }) => {
        assert_eq!(command, "echo compiling; exit 2");
        assert_eq!(*exit_code, Some(2));
        assert!(log_tail.iter().any(|l| l == "compiling"));
      }
      other => panic!("unexpected error: {other:?}"),
    }

    let app = f.stores().entry(executor.graph().root_task());
    assert!(!app.install_dir.exists());
  }

  #[tokio::test]
  async fn real_failure_wins_over_cancellations() {
    let f = Fixture::new();
    let builder = SolutionBuilder::new("app")
      .dep("app", "bad")
      .dep("app", "slow")
      .dep("slow", "later")
      .build_cmd("bad", "exit 1")
      .build_cmd("slow", "true");
    let builder = ["app", "bad", "slow", "later"]
      .into_iter()
      .fold(builder, |b, name| f.source(b, name));
    let options = BuildOptions {
      concurrency: 1,
      ..BuildOptions::default()
    };

    let err = f.executor(builder, options).build_root().await.unwrap_err();
    assert!(!err.is_cancelled());
    assert!(matches!(err.as_build_error(), Some(BuildError::CommandFailed { .. })));
  }

  #[tokio::test]
  async fn failing_shared_dependency_runs_once_and_fails_both_parents() {
    let f = Fixture::new();
    let counter = f.path().join("count");
    let builder = SolutionBuilder::new("app")
      .dep("app", "left")
      .dep("app", "right")
      .dep("left", "base")
      .dep("right", "base")
      .build_cmd("base", &format!("echo run >> {}; exit 3", counter.display()));
    let builder = ["app", "left", "right", "base"]
      .into_iter()
      .fold(builder, |b, name| f.source(b, name));
    let executor = f.executor(builder, options());
    let graph = executor.graph();
    let parents = [graph.find("left").unwrap(), graph.find("right").unwrap()];

    let err = executor.build(&parents).await.unwrap_err();
    assert!(matches!(err.as_build_error(), Some(BuildError::CommandFailed { .. })));
    assert_eq!(std::fs::read_to_string(&counter).unwrap(), "run\n");

    let cells = executor.inner.cells.lock().await;
    for idx in parents {
      let id = &graph.task(idx).id;
      match cells.get(id).and_then(|cell| cell.get()) {
        Some(Err(err)) => match err.as_build_error() {
          Some(BuildError::CommandFailed { exit_code, .. }) => assert_eq!(*exit_code, Some(3)),
          other => panic!("unexpected error for {id}: {other:?}"),
        },
        other => panic!("unexpected result for {id}: {other:?}"),
      }
    }
  }

  #[tokio::test]
  async fn failure_stops_new_work_but_running_siblings_commit() {
    let f = Fixture::new();
    let builder = SolutionBuilder::new("app")
      .dep("app", "bad")
      .dep("app", "after")
      .dep("after", "slow")
      .build_cmd("bad", "exit 1")
      .build_cmd("slow", "sleep 1; echo done > #{self.share}/done")
      .build_cmd("after", "echo after > #{self.share}/after");
    let builder = ["app", "bad", "after", "slow"]
      .into_iter()
      .fold(builder, |b, name| f.source(b, name));
    let options = BuildOptions {
      concurrency: 2,
      ..BuildOptions::default()
    };
    let executor = f.executor(builder, options);

    let err = executor.build_root().await.unwrap_err();
    assert!(!err.is_cancelled());
    assert!(matches!(err.as_build_error(), Some(BuildError::CommandFailed { .. })));

    let graph = executor.graph();
    let entry = |name: &str| f.stores().entry(graph.task(graph.find(name).unwrap()));
    assert_eq!(
      std::fs::read_to_string(entry("slow").install_dir.join("share/done")).unwrap(),
      "done\n"
    );
    assert!(!entry("after").install_dir.exists());
    assert!(!entry("bad").install_dir.exists());
    assert!(!entry("app").install_dir.exists());
  }

  // ==========================================================================
  // Staleness
  // ==========================================================================

  #[tokio::test]
  async fn linked_change_rebuilds_dependents() {
    let f = Fixture::new();
    let builder = || chain(&f).kind("lib", SourceKind::Linked);
    f.executor(builder(), options()).build_root().await.unwrap();

    write_file(&f.path().join("src/lib"), "lib.ml", "let x = 2");
    let report = f.executor(builder(), options()).build_root().await.unwrap();
    assert_eq!(report.built.len(), 2);

    let report = f.executor(builder(), options()).build_root().await.unwrap();
    assert!(report.built.is_empty());
  }

  #[tokio::test]
  async fn force_local_rebuilds_only_mutable_tasks() {
    let f = Fixture::new();
    f.executor(chain(&f), options()).build_root().await.unwrap();

    let forced = BuildOptions {
      force_local: true,
      ..options()
    };
    let report = f.executor(chain(&f), forced).build_root().await.unwrap();
    assert_eq!(report.built.len(), 1);
    assert_eq!(report.cached.len(), 1);
  }

  #[tokio::test]
  async fn skip_staleness_check_rebuilds_unchanged_linked_tasks() {
    let f = Fixture::new();
    let builder = || chain(&f).kind("lib", SourceKind::Linked);
    f.executor(builder(), options()).build_root().await.unwrap();

    let skipping = BuildOptions {
      skip_staleness_check: true,
      ..options()
    };
    let report = f.executor(builder(), skipping).build_root().await.unwrap();
    assert_eq!(report.built.len(), 2);
    assert!(report.cached.is_empty());

    let report = f.executor(builder(), options()).build_root().await.unwrap();
    assert!(report.built.is_empty());
  }

  #[tokio::test]
  async fn skip_staleness_check_leaves_immutable_tasks_cached() {
    let f = Fixture::new();
    f.executor(chain(&f), options()).build_root().await.unwrap();

    let skipping = BuildOptions {
      skip_staleness_check: true,
      ..options()
    };
    let report = f.executor(chain(&f), skipping).build_root().await.unwrap();
    assert_eq!(report.built.len(), 1);
    assert_eq!(report.cached.len(), 1);
  }

  // ==========================================================================
  // Layout
  // ==========================================================================

  #[tokio::test]
  async fn in_source_builds_run_in_a_copy() {
    let f = Fixture::new();
    let builder = SolutionBuilder::new("app")
      .in_source("app")
      .build_cmd("app", "touch built-here && cp README #{self.share}/README");
    let builder = f.source(builder, "app");
    let executor = f.executor(builder, options());

    executor.build_root().await.unwrap();

    let entry = f.stores().entry(executor.graph().root_task());
    assert!(entry.build_dir.join("built-here").exists());
    assert!(entry.install_dir.join("share/README").is_file());
    assert!(!f.path().join("src/app/built-here").exists());
  }

  #[tokio::test]
  async fn root_gets_dev_links() {
    let f = Fixture::new();
    let builder = f.source(SolutionBuilder::new("app"), "app");
    let project = f.path().join("src/app");
    let executor = f.executor(builder, options()).with_dev_links(&project);

    executor.build_root().await.unwrap();

    let entry = f.stores().entry(executor.graph().root_task());
    assert_eq!(std::fs::read_link(project.join(INSTALL_LINK)).unwrap(), entry.install_dir);
    assert_eq!(std::fs::read_link(project.join(BUILD_LINK)).unwrap(), entry.build_dir);
  }

  #[tokio::test]
  #[traced_test]
  async fn exported_builds_are_imported_instead_of_built() {
    let f = Fixture::new();
    let executor = f.executor(chain(&f), options());
    executor.build_root().await.unwrap();

    let graph = executor.graph();
    let lib = graph.task(graph.find("lib").unwrap());
    let exports = f.path().join("exports");
    archive::export(f.stores().global(), &lib.id, &exports).unwrap();
    std::fs::remove_dir_all(f.stores().entry(lib).install_dir).unwrap();

    let importing = BuildOptions {
      import_paths: vec![exports],
      ..options()
    };
    let report = f.executor(chain(&f), importing).build_root().await.unwrap();
    assert_eq!(report.imported, vec![lib.id.clone()]);
    assert!(logs_contain("imported lib@1.0.0"));
  }
}
