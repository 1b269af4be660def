//! Host platform detection and per-user paths.

pub mod arch;
pub mod os;
pub mod paths;

use arch::Arch;
use os::{Os, OsRelease};

/// Host facts exposed to opam-style placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
  pub release: OsRelease,
}

impl Platform {
  /// Detect the current platform at runtime
  pub fn current() -> Self {
    let os = Os::current();
    Self {
      arch: Arch::current(),
      os,
      release: OsRelease::detect(os),
    }
  }
}
