use std::path::Path;

use tracing::{debug, warn};

use super::StoreError;
use crate::consts::SOURCE_IGNORE;
use crate::util::hash::{ContentHash, FileHashCache, hash_directory};

/// Hash a source tree for staleness checks.
///
/// The per-file cache at `cache_path` lets unchanged files (same length and
/// mtime) skip re-reading; the result depends on content only.
pub fn fingerprint_source(source: &Path, cache_path: &Path) -> Result<ContentHash, StoreError> {
  let mut cache = FileHashCache::load(cache_path);
  let cached = cache.len();

  let hash = hash_directory(source, SOURCE_IGNORE, Some(&mut cache)).map_err(|e| StoreError::Corrupt {
    path: source.to_path_buf(),
    message: e.to_string(),
  })?;
  debug!(source = ?source, files = cache.len(), cached, hash = %hash, "fingerprinted sources");

  if let Err(e) = cache.save(cache_path) {
    warn!(path = ?cache_path, error = %e, "failed to save fingerprint cache");
  }
  Ok(hash)
}
