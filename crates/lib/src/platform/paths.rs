use crate::consts::{APP_NAME, STORE_VERSION};
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

/// Default prefix holding the global store (`~/.esy`).
pub fn default_prefix() -> Option<PathBuf> {
  home_dir().map(|home| home.join(format!(".{APP_NAME}")))
}

/// Global store root for a prefix (`<prefix>/3`).
pub fn store_root(prefix: &std::path::Path) -> PathBuf {
  prefix.join(STORE_VERSION)
}
