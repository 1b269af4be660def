//! Types for the build executor.

use std::path::PathBuf;

use thiserror::Error;

use crate::plan::TaskId;
use crate::store::StoreTier;

/// Errors raised while running a task's commands.
#[derive(Debug, Error)]
pub enum BuildError {
  /// A build or install command exited unsuccessfully.
  #[error("command failed with exit code {}: {command}", display_code(.exit_code))]
  CommandFailed {
    task: String,
    command: String,
    exit_code: Option<i32>,
    log_path: PathBuf,
    log_tail: Vec<String>,
  },

  /// A command could not be started.
  #[error("failed to spawn {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  /// Another branch of the invocation failed first.
  #[error("build cancelled after an earlier failure")]
  Cancelled,

  #[error("build task panicked: {message}")]
  Internal { message: String },
}

fn display_code(code: &Option<i32>) -> String {
  code.map_or_else(|| "none (killed by signal)".to_string(), |c| c.to_string())
}

/// Executor settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
  /// Maximum number of tasks running commands at once.
  pub concurrency: usize,
  /// Rebuild root and linked packages even when their sources are unchanged.
  pub force_local: bool,
  /// Rebuild root and linked packages without comparing source fingerprints.
  pub skip_staleness_check: bool,
  /// Directories searched for exported builds before building.
  pub import_paths: Vec<PathBuf>,
  /// Shell for string commands.
  pub shell: Option<String>,
}

impl Default for BuildOptions {
  fn default() -> Self {
    Self {
      concurrency: 1,
      force_local: false,
      skip_staleness_check: false,
      import_paths: Vec::new(),
      shell: None,
    }
  }
}

/// How a task's store entry came to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// Commands ran in this invocation.
  Built,
  /// Already in the store and up to date.
  Cached,
  /// Imported from an export found on an import path.
  Imported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
  pub id: TaskId,
  pub tier: StoreTier,
  pub outcome: Outcome,
  pub install_dir: PathBuf,
}

/// Summary of an executor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
  pub built: Vec<TaskId>,
  pub cached: Vec<TaskId>,
  pub imported: Vec<TaskId>,
}

impl BuildReport {
  pub(crate) fn record(&mut self, result: &TaskResult) {
    let list = match result.outcome {
      Outcome::Built => &mut self.built,
      Outcome::Cached => &mut self.cached,
      Outcome::Imported => &mut self.imported,
    };
    list.push(result.id.clone());
  }
}
