//! Hashing utilities for task ids and source fingerprints.
//!
//! This module provides:
//! - `Hashable`: truncated SHA-256 of a JSON-serialized value, used for task ids
//! - `ContentHash`: a full 64-character hash for content verification
//! - `hash_directory()`: deterministic directory hashing with an optional
//!   `(len, mtime)` cache that avoids re-reading unchanged files
//! - `hash_file()` / `hash_bytes()`

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::consts::ID_HASH_LEN;

pub type HashError = serde_json::Error;

pub trait Hashable: Serialize {
  /// Lowercase hex SHA-256 of the JSON serialization, truncated to `ID_HASH_LEN`.
  fn short_hash(&self) -> Result<String, HashError> {
    let serialized = serde_json::to_vec(self)?;
    let digest = Sha256::digest(&serialized);
    let mut full = hex::encode(digest);
    full.truncate(ID_HASH_LEN);
    Ok(full)
  }
}

/// A full 64-character SHA256 hash for content verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error during directory hashing.
#[derive(Debug, thiserror::Error)]
pub enum DirHashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },

  #[error("failed to read symlink {path}: {message}")]
  ReadSymlink { path: String, message: String },
}

/// Per-file hashes keyed by relative path, reused while `(len, mtime)` match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileHashCache {
  files: BTreeMap<String, CachedFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CachedFile {
  len: u64,
  mtime_ns: u128,
  hash: String,
}

impl FileHashCache {
  /// Load a cache file, treating a missing or unreadable file as empty.
  pub fn load(path: &Path) -> Self {
    fs::read(path)
      .ok()
      .and_then(|bytes| serde_json::from_slice(&bytes).ok())
      .unwrap_or_default()
  }

  pub fn save(&self, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_vec(self).map_err(std::io::Error::other)?;
    super::fs::atomic_write(path, &json)
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

/// Compute a deterministic hash of a directory's contents.
///
/// The hash covers relative paths, file contents, the executable bit and
/// symlink targets. Timestamps never affect the result. Entries whose file
/// name is in `exclude` are skipped together with their subtrees.
///
/// When `cache` is given, files whose length and mtime match the cached entry
/// are not re-read; the cache is rebuilt to contain exactly the files seen.
pub fn hash_directory(
  path: &Path,
  exclude: &[&str],
  mut cache: Option<&mut FileHashCache>,
) -> Result<ContentHash, DirHashError> {
  let mut entries: Vec<(String, String)> = Vec::new();
  let mut seen = FileHashCache::default();

  let walker = WalkDir::new(path).sort_by_file_name().into_iter().filter_entry(|e| {
    e.depth() == 0
      || e
        .file_name()
        .to_str()
        .map(|name| !exclude.contains(&name))
        .unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(|e| DirHashError::WalkDir { message: e.to_string() })?;
    let entry_path = entry.path();

    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .replace('\\', "/");

    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let entry_hash = if file_type.is_file() {
      let meta = entry.metadata().map_err(|e| DirHashError::ReadFile {
        path: entry_path.display().to_string(),
        message: e.to_string(),
      })?;
      let len = meta.len();
      let mtime_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);

      let cached = cache
        .as_deref()
        .and_then(|c| c.files.get(&rel_path))
        .filter(|c| c.len == len && c.mtime_ns == mtime_ns)
        .map(|c| c.hash.clone());
      let hash = match cached {
        Some(hash) => hash,
        None => hash_file(entry_path)?.0,
      };
      seen.files.insert(
        rel_path.clone(),
        CachedFile {
          len,
          mtime_ns,
          hash: hash.clone(),
        },
      );

      let mode = if is_executable(&meta) { "x" } else { "-" };
      format!("F:{rel_path}:{mode}:{hash}")
    } else if file_type.is_dir() {
      format!("D:{rel_path}")
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|e| DirHashError::ReadSymlink {
        path: entry_path.display().to_string(),
        message: e.to_string(),
      })?;
      format!("L:{rel_path}:{}", target.to_string_lossy())
    } else {
      continue;
    };

    entries.push((rel_path, entry_hash));
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));

  let mut hasher = Sha256::new();
  for (_, entry_hash) in entries {
    hasher.update(entry_hash.as_bytes());
    hasher.update(b"\n");
  }

  if let Some(cache) = cache.as_deref_mut() {
    *cache = seen;
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
  use std::os::unix::fs::PermissionsExt;
  meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
  false
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, DirHashError> {
  let mut file = fs::File::open(path).map_err(|e| DirHashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  })?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(|e| DirHashError::ReadFile {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}
