//! Lock file and installation map.
//!
//! The lock file (`esy.lock/index.json`) pins the resolved package graph:
//!
//! ```json
//! {
//!   "hash": "5f1c…",
//!   "root": "app@1.0.0@d41d8cd9",
//!   "node": {
//!     "app@1.0.0@d41d8cd9": {
//!       "name": "app", "version": "1.0.0", "source": "link-dev:./package.json",
//!       "dependencies": ["dep@1.0.0@0a1b2c3d"], "devDependencies": []
//!     }
//!   }
//! }
//! ```
//!
//! The installation map (`_esy/<sandbox>/installation.json`) records where each
//! package's sources live on disk:
//!
//! ```json
//! { "dep@1.0.0@0a1b2c3d": { "type": "link", "path": "/abs/dep", "source": "link:./dep" } }
//! ```
//!
//! Both files are read, then rewritten whole; concurrent external edits are not
//! detected.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sandbox::overrides::Override;
use crate::util::fs::atomic_write;

#[derive(Debug, Error)]
pub enum LockError {
  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {}: {source}", .path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("lock file references unknown package {0}")]
  MissingNode(String),

  #[error("package {0} is not installed")]
  NotInstalled(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockFile {
  /// Hash of the manifest inputs the solution was computed from.
  pub hash: String,
  /// Id of the root package.
  pub root: String,
  pub node: BTreeMap<String, LockNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockNode {
  pub name: String,
  pub version: String,
  pub source: String,
  #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
  pub override_: Option<Override>,
  #[serde(default)]
  pub dependencies: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub build_dependencies: Vec<String>,
  #[serde(default)]
  pub dev_dependencies: Vec<String>,
}

impl LockFile {
  /// Load a lock file. Returns `Ok(None)` if it doesn't exist.
  pub fn load(path: &Path) -> Result<Option<Self>, LockError> {
    read_json(path)
  }

  /// Save as pretty-printed JSON, atomically.
  pub fn save(&self, path: &Path) -> Result<(), LockError> {
    write_json(path, self)
  }

  pub fn get(&self, id: &str) -> Result<&LockNode, LockError> {
    self.node.get(id).ok_or_else(|| LockError::MissingNode(id.to_string()))
  }
}

/// Where a package's sources come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallKind {
  /// A mutable source tree, checked for staleness.
  Link,
  /// An immutable source tree.
  Install,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallEntry {
  #[serde(rename = "type")]
  pub kind: InstallKind,
  pub path: PathBuf,
  pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Installation(pub BTreeMap<String, InstallEntry>);

impl Installation {
  /// Load an installation map. Returns `Ok(None)` if it doesn't exist.
  pub fn load(path: &Path) -> Result<Option<Self>, LockError> {
    read_json(path)
  }

  pub fn save(&self, path: &Path) -> Result<(), LockError> {
    write_json(path, self)
  }

  pub fn get(&self, id: &str) -> Result<&InstallEntry, LockError> {
    self.0.get(id).ok_or_else(|| LockError::NotInstalled(id.to_string()))
  }

  /// True when every recorded source path still exists.
  pub fn is_fetched(&self) -> bool {
    self.0.values().all(|entry| entry.path.exists())
  }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, LockError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(LockError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };
  serde_json::from_str(&content).map(Some).map_err(|source| LockError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), LockError> {
  let mut content = serde_json::to_string_pretty(value).map_err(|source| LockError::Parse {
    path: path.to_path_buf(),
    source,
  })?;
  content.push('\n');
  atomic_write(path, content.as_bytes()).map_err(|source| LockError::Write {
    path: path.to_path_buf(),
    source,
  })
}
