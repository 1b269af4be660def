//! The content-addressed build store.
//!
//! Two stores share one layout: the global store (`<prefix>/3`) holds
//! immutable dependencies shared across projects, and the local store
//! (`<project>/_esy/<sandbox>/store`) holds the root package, linked packages
//! and anything depending on them.
//!
//! # Layout
//!
//! ```text
//! <store>/
//! ├── b/<id>/               # build directory (target_dir)
//! ├── b/<id>.log            # combined output of the last build
//! ├── b/<id>.srcinfo.json   # per-file hash cache for mutable sources
//! ├── s/<id>/               # staged install, written by install commands
//! └── i/<id>/               # committed install
//!     └── _esy/
//!         ├── storePrefix   # store root at commit time
//!         └── checksum      # source fingerprint (mutable sources only)
//! ```
//!
//! A staged install becomes visible only through a rename into `i/`, so readers
//! never see a partial entry.

pub mod archive;
mod fingerprint;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::{
  BUILD_TREE, CHECKSUM_FILE, INSTALL_LAYOUT, INSTALL_TREE, META_DIR, STAGE_TREE, STORE_PREFIX_FILE,
};
use crate::plan::{BuildTask, TaskId};
use crate::util::fs::{relocate_symlinks, remove_path, rewrite_in_files};
use crate::util::hash::ContentHash;

pub use fingerprint::fingerprint_source;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store I/O error at {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("store entry {0} does not exist")]
  MissingEntry(String),

  #[error("corrupt store entry at {}: {message}", .path.display())]
  Corrupt { path: PathBuf, message: String },

  #[error("failed to process archive {}: {source}", .path.display())]
  Archive {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Attach a path to an I/O error.
pub(crate) fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
  move |source| StoreError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Which store holds a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreTier {
  /// Per-project store for mutable sources and their dependents.
  Local,
  /// Shared store for immutable dependencies.
  Global,
}

/// One store root and its `b`/`s`/`i` trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
  root: PathBuf,
}

impl Store {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn build_dir(&self, id: &TaskId) -> PathBuf {
    self.root.join(BUILD_TREE).join(id.as_str())
  }

  pub fn stage_dir(&self, id: &TaskId) -> PathBuf {
    self.root.join(STAGE_TREE).join(id.as_str())
  }

  pub fn install_dir(&self, id: &TaskId) -> PathBuf {
    self.root.join(INSTALL_TREE).join(id.as_str())
  }

  pub fn log_path(&self, id: &TaskId) -> PathBuf {
    self.root.join(BUILD_TREE).join(format!("{id}.log"))
  }

  fn srcinfo_path(&self, id: &TaskId) -> PathBuf {
    self.root.join(BUILD_TREE).join(format!("{id}.srcinfo.json"))
  }

  /// True when `i/<id>` exists.
  pub fn contains(&self, id: &TaskId) -> bool {
    self.install_dir(id).is_dir()
  }
}

/// Locations of one task's store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
  pub tier: StoreTier,
  pub store_root: PathBuf,
  pub build_dir: PathBuf,
  pub stage_dir: PathBuf,
  pub install_dir: PathBuf,
  pub log_path: PathBuf,
}

/// Current state of a task's store entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
  Absent,
  /// Built from sources that have since changed.
  Stale,
  Built,
}

/// Result of a staleness check, carrying the fingerprint to record on commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
  pub state: EntryState,
  pub fingerprint: Option<ContentHash>,
}

/// The global and local stores of a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreManager {
  global: Store,
  local: Store,
}

impl StoreManager {
  pub fn new(global_root: impl Into<PathBuf>, local_root: impl Into<PathBuf>) -> Self {
    Self {
      global: Store::new(global_root),
      local: Store::new(local_root),
    }
  }

  pub fn store(&self, tier: StoreTier) -> &Store {
    match tier {
      StoreTier::Local => &self.local,
      StoreTier::Global => &self.global,
    }
  }

  pub fn global(&self) -> &Store {
    &self.global
  }

  pub fn local(&self) -> &Store {
    &self.local
  }

  pub fn entry(&self, task: &BuildTask) -> StoreEntry {
    let store = self.store(task.tier);
    StoreEntry {
      tier: task.tier,
      store_root: store.root().to_path_buf(),
      build_dir: store.build_dir(&task.id),
      stage_dir: store.stage_dir(&task.id),
      install_dir: store.install_dir(&task.id),
      log_path: store.log_path(&task.id),
    }
  }

  pub fn is_built(&self, task: &BuildTask) -> bool {
    self.store(task.tier).contains(&task.id)
  }

  /// Content fingerprint of a mutable task's sources.
  pub fn fingerprint(&self, task: &BuildTask) -> Result<ContentHash, StoreError> {
    let cache = self.store(task.tier).srcinfo_path(&task.id);
    fingerprint_source(&task.source_path, &cache)
  }

  /// Decide whether `task` needs building.
  ///
  /// Immutable tasks are built once their install dir exists. Mutable tasks
  /// additionally need the recorded checksum to match the current sources.
  pub fn check(&self, task: &BuildTask) -> Result<Check, StoreError> {
    if !task.is_mutable() {
      let state = if self.is_built(task) {
        EntryState::Built
      } else {
        EntryState::Absent
      };
      return Ok(Check {
        state,
        fingerprint: None,
      });
    }

    let fingerprint = self.fingerprint(task)?;
    let state = if !self.is_built(task) {
      EntryState::Absent
    } else {
      let recorded = read_meta(&self.entry(task).install_dir, CHECKSUM_FILE);
      if recorded.as_deref() == Some(fingerprint.0.as_str()) {
        EntryState::Built
      } else {
        debug!(task = %task.label(), recorded = ?recorded, current = %fingerprint, "sources changed");
        EntryState::Stale
      }
    };
    Ok(Check {
      state,
      fingerprint: Some(fingerprint),
    })
  }

  /// Reset the build and stage dirs and create the install layout in the stage dir.
  pub fn prepare(&self, task: &BuildTask) -> Result<StoreEntry, StoreError> {
    let entry = self.entry(task);
    for dir in [&entry.build_dir, &entry.stage_dir] {
      remove_path(dir).map_err(io_err(dir))?;
    }
    fs::create_dir_all(&entry.build_dir).map_err(io_err(&entry.build_dir))?;
    for sub in INSTALL_LAYOUT {
      let dir = entry.stage_dir.join(sub);
      fs::create_dir_all(&dir).map_err(io_err(&dir))?;
    }
    Ok(entry)
  }

  /// Promote the staged install to `i/<id>`.
  ///
  /// Records the store root and fingerprint, rewrites the stage path inside
  /// installed files and symlinks that point into the stage dir, then renames
  /// the stage dir into place. `s/` and `i/` have the same length, so binaries
  /// keep their layout. An existing install is moved aside first and removed
  /// after the rename.
  pub fn commit(&self, task: &BuildTask, fingerprint: Option<&ContentHash>) -> Result<PathBuf, StoreError> {
    let entry = self.entry(task);
    let stage = &entry.stage_dir;
    if !stage.is_dir() {
      return Err(StoreError::MissingEntry(stage.display().to_string()));
    }

    write_meta(stage, STORE_PREFIX_FILE, &entry.store_root.to_string_lossy())?;
    if let Some(fingerprint) = fingerprint {
      write_meta(stage, CHECKSUM_FILE, &fingerprint.0)?;
    }

    let files = rewrite_in_files(
      stage,
      &stage.to_string_lossy(),
      &entry.install_dir.to_string_lossy(),
    )
    .map_err(io_err(stage))?;
    let relocated = relocate_symlinks(stage, stage, &entry.install_dir).map_err(io_err(stage))?;
    if files > 0 || relocated > 0 {
      debug!(task = %task.label(), files, links = relocated, "relocated staged paths");
    }

    promote(stage, &entry.install_dir)?;
    Ok(entry.install_dir)
  }

  /// Drop the cached per-file hashes of a task.
  pub fn forget_fingerprint(&self, task: &BuildTask) {
    let path = self.store(task.tier).srcinfo_path(&task.id);
    if let Err(e) = remove_path(&path) {
      warn!(path = ?path, error = %e, "failed to remove fingerprint cache");
    }
  }
}

/// Rename `from` to `to`, replacing any existing directory at `to`.
pub(crate) fn promote(from: &Path, to: &Path) -> Result<(), StoreError> {
  if let Some(parent) = to.parent() {
    fs::create_dir_all(parent).map_err(io_err(parent))?;
  }

  let previous = if to.exists() {
    let name = to.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let aside = to.with_file_name(format!("{name}.old-{}", std::process::id()));
    remove_path(&aside).map_err(io_err(&aside))?;
    fs::rename(to, &aside).map_err(io_err(to))?;
    Some(aside)
  } else {
    None
  };

  fs::rename(from, to).map_err(io_err(to))?;

  if let Some(aside) = previous
    && let Err(e) = remove_path(&aside)
  {
    warn!(path = ?aside, error = %e, "failed to remove replaced install");
  }
  Ok(())
}

/// Read `<dir>/_esy/<name>`, trimmed.
pub fn read_meta(dir: &Path, name: &str) -> Option<String> {
  fs::read_to_string(dir.join(META_DIR).join(name))
    .ok()
    .map(|s| s.trim().to_string())
}

fn write_meta(dir: &Path, name: &str, value: &str) -> Result<(), StoreError> {
  let meta = dir.join(META_DIR);
  fs::create_dir_all(&meta).map_err(io_err(&meta))?;
  let path = meta.join(name);
  fs::write(&path, value).map_err(io_err(&path))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::plan::{BuildMode, TaskGraph};
  use crate::sandbox::SourceKind;
  use crate::util::testutil::{SolutionBuilder, write_file};
  use tempfile::TempDir;

  struct Fixture {
    _temp: TempDir,
    source: PathBuf,
    stores: StoreManager,
    graph: TaskGraph,
  }

  fn fixture(kind: SourceKind) -> Fixture {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src/dep");
    write_file(&source, "main.ml", "let () = print_endline \"dep\"");
    let solution = SolutionBuilder::new("root")
      .dep("root", "dep")
      .kind("dep", kind)
      .path("dep", &source)
      .build();
    let graph = TaskGraph::build(&solution, BuildMode::Dev).unwrap();
    let stores = StoreManager::new(temp.path().join("global/3"), temp.path().join("project/_esy/default/store"));
    Fixture {
      _temp: temp,
      source,
      stores,
      graph,
    }
  }

  impl Fixture {
    fn dep(&self) -> &BuildTask {
      self.graph.task(self.graph.find("dep").unwrap())
    }

    fn build(&self) {
      let task = self.dep();
      let check = self.stores.check(task).unwrap();
      let entry = self.stores.prepare(task).unwrap();
      std::fs::write(entry.stage_dir.join("bin/dep.exe"), "#!/bin/sh\necho dep\n").unwrap();
      self.stores.commit(task, check.fingerprint.as_ref()).unwrap();
    }
  }

  #[test]
  fn entry_paths_follow_tier() {
    let fx = fixture(SourceKind::Immutable);
    let task = fx.dep();
    let entry = fx.stores.entry(task);

    assert_eq!(entry.tier, StoreTier::Global);
    assert!(entry.install_dir.ends_with(format!("global/3/i/{}", task.id)));
    assert!(entry.log_path.ends_with(format!("global/3/b/{}.log", task.id)));

    let root_entry = fx.stores.entry(fx.graph.root_task());
    assert!(root_entry.build_dir.starts_with(fx.stores.local().root()));
  }

  #[test]
  fn immutable_entry_is_never_stale_once_built() {
    let fx = fixture(SourceKind::Immutable);
    assert_eq!(fx.stores.check(fx.dep()).unwrap().state, EntryState::Absent);

    fx.build();
    write_file(&fx.source, "main.ml", "changed");

    assert_eq!(fx.stores.check(fx.dep()).unwrap().state, EntryState::Built);
  }

  #[test]
  fn linked_entry_goes_stale_on_content_change_only() {
    let fx = fixture(SourceKind::Linked);
    fx.build();
    assert_eq!(fx.stores.check(fx.dep()).unwrap().state, EntryState::Built);

    // Same content, new mtime.
    write_file(&fx.source, "main.ml", "let () = print_endline \"dep\"");
    assert_eq!(fx.stores.check(fx.dep()).unwrap().state, EntryState::Built);

    write_file(&fx.source, "main.ml", "let () = print_endline \"changed\"");
    assert_eq!(fx.stores.check(fx.dep()).unwrap().state, EntryState::Stale);
  }

  #[test]
  fn missing_checksum_is_stale() {
    let fx = fixture(SourceKind::Linked);
    let task = fx.dep();
    fx.stores.prepare(task).unwrap();
    fx.stores.commit(task, None).unwrap();

    assert_eq!(fx.stores.check(task).unwrap().state, EntryState::Stale);
  }

  #[test]
  fn commit_replaces_previous_install_and_records_prefix() {
    let fx = fixture(SourceKind::Immutable);
    fx.build();
    let task = fx.dep();
    let entry = fx.stores.entry(task);
    std::fs::write(entry.install_dir.join("stale.txt"), "old").unwrap();

    fx.build();

    assert!(!entry.install_dir.join("stale.txt").exists());
    assert!(!entry.stage_dir.exists());
    assert_eq!(
      read_meta(&entry.install_dir, STORE_PREFIX_FILE).as_deref(),
      Some(fx.stores.global().root().to_string_lossy().as_ref())
    );
  }

  #[cfg(unix)]
  #[test]
  fn commit_relocates_symlinks_into_install_dir() {
    let fx = fixture(SourceKind::Immutable);
    let task = fx.dep();
    let entry = fx.stores.prepare(task).unwrap();
    std::fs::write(entry.stage_dir.join("lib/tool.sh"), "#!/bin/sh\n").unwrap();
    std::os::unix::fs::symlink(entry.stage_dir.join("lib/tool.sh"), entry.stage_dir.join("bin/tool")).unwrap();

    fx.stores.commit(task, None).unwrap();

    let target = std::fs::read_link(entry.install_dir.join("bin/tool")).unwrap();
    assert_eq!(target, entry.install_dir.join("lib/tool.sh"));
  }

  #[test]
  fn commit_without_stage_is_an_error() {
    let fx = fixture(SourceKind::Immutable);
    let err = fx.stores.commit(fx.dep(), None).unwrap_err();
    assert!(matches!(err, StoreError::MissingEntry(_)));
  }

  #[test]
  fn commit_rewrites_stage_paths_in_installed_files() {
    let fx = fixture(SourceKind::Immutable);
    let task = fx.dep();
    let entry = fx.stores.prepare(task).unwrap();
    let script = format!("#!/bin/sh\ncat {}/share/msg\n", entry.stage_dir.display());
    std::fs::write(entry.stage_dir.join("bin/tool"), script).unwrap();
    std::fs::write(entry.stage_dir.join("share/msg"), "hello").unwrap();

    fx.stores.commit(task, None).unwrap();

    let installed = std::fs::read_to_string(entry.install_dir.join("bin/tool")).unwrap();
    assert_eq!(installed, format!("#!/bin/sh\ncat {}/share/msg\n", entry.install_dir.display()));
    assert!(!installed.contains(&entry.stage_dir.to_string_lossy().to_string()));
  }
}
