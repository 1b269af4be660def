//! Runtime configuration.
//!
//! Settings come from `ESY__*` environment variables first, then the project's
//! `.esyrc` (YAML), then built-in defaults. The result is computed once and
//! passed by reference.

use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::consts::{ENV_BUILD_CONCURRENCY, ENV_PREFIX_PATH, RC_FILE};
use crate::platform::paths;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {message}", .path.display())]
  Parse { path: PathBuf, message: String },

  #[error("invalid value for {key}: '{value}'")]
  InvalidValue { key: String, value: String },

  #[error("cannot determine the store prefix: set ESY__PREFIX or HOME")]
  NoPrefix,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  /// Prefix of the global store (`<prefix>/3/{b,s,i}`).
  pub prefix_path: PathBuf,
  /// Maximum number of builds running at once.
  pub build_concurrency: usize,
  /// Directories searched for `<id>` or `<id>.tar.gz` before building a task.
  pub import_paths: Vec<PathBuf>,
  /// Shell used for string commands; `/bin/sh` when unset.
  pub shell: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RcFile {
  #[serde(rename = "esy-prefix-path")]
  prefix_path: Option<PathBuf>,
  #[serde(rename = "esy-build-concurrency")]
  build_concurrency: Option<usize>,
  #[serde(rename = "esy-import-path", default)]
  import_paths: Vec<PathBuf>,
}

impl Config {
  /// Resolve configuration for the project rooted at `project_root`.
  pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
    let rc = read_rc(&project_root.join(RC_FILE))?;

    let prefix_path = match std::env::var_os(ENV_PREFIX_PATH).filter(|v| !v.is_empty()) {
      Some(prefix) => PathBuf::from(prefix),
      None => match rc.prefix_path {
        Some(prefix) if prefix.is_relative() => project_root.join(prefix),
        Some(prefix) => prefix,
        None => paths::default_prefix().ok_or(ConfigError::NoPrefix)?,
      },
    };

    let build_concurrency = match std::env::var(ENV_BUILD_CONCURRENCY) {
      Ok(value) => parse_concurrency(&value)?,
      Err(_) => rc.build_concurrency.filter(|n| *n > 0).unwrap_or_else(default_concurrency),
    };

    let import_paths = rc
      .import_paths
      .into_iter()
      .map(|p| if p.is_relative() { project_root.join(p) } else { p })
      .collect();

    Ok(Self {
      prefix_path,
      build_concurrency,
      import_paths,
      shell: None,
    })
  }

  /// Configuration with an explicit prefix, used by tests and embedders.
  pub fn with_prefix(prefix_path: impl Into<PathBuf>) -> Self {
    Self {
      prefix_path: prefix_path.into(),
      build_concurrency: default_concurrency(),
      import_paths: Vec::new(),
      shell: None,
    }
  }

  /// Root of the global store for this prefix.
  pub fn global_store_root(&self) -> PathBuf {
    paths::store_root(&self.prefix_path)
  }
}

fn read_rc(path: &Path) -> Result<RcFile, ConfigError> {
  match std::fs::read_to_string(path) {
    Ok(content) if content.trim().is_empty() => Ok(RcFile::default()),
    Ok(content) => serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      message: e.to_string(),
    }),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RcFile::default()),
    Err(source) => Err(ConfigError::Read {
      path: path.to_path_buf(),
      source,
    }),
  }
}

fn parse_concurrency(value: &str) -> Result<usize, ConfigError> {
  value
    .trim()
    .parse::<NonZeroUsize>()
    .map(NonZeroUsize::get)
    .map_err(|_| ConfigError::InvalidValue {
      key: ENV_BUILD_CONCURRENCY.to_string(),
      value: value.to_string(),
    })
}

fn default_concurrency() -> usize {
  std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}
