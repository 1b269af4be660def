//! Crate-level error type.
//!
//! Every component has its own error enum; [`Error`] wraps them and carries the
//! human-readable frames ("processing dep@1.0.0", "building dep@1.0.0") added
//! while an error unwinds through the planner and executor.

use std::sync::Arc;

use thiserror::Error;

use crate::build::BuildError;
use crate::config::ConfigError;
use crate::manifest::ManifestError;
use crate::placeholder::PlaceholderError;
use crate::plan::CircularDependencyError;
use crate::sandbox::lock::LockError;
use crate::sandbox::overrides::OverrideError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Override(#[from] OverrideError),

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error(transparent)]
  Cycle(#[from] CircularDependencyError),

  #[error(transparent)]
  Placeholder(#[from] PlaceholderError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  /// A context frame wrapped around a deeper error.
  #[error("{frame}")]
  Context {
    frame: String,
    #[source]
    source: Box<Error>,
  },

  /// An error observed by several awaiters of the same task.
  #[error(transparent)]
  Shared(Arc<Error>),
}

impl Error {
  pub fn context(frame: impl Into<String>, source: impl Into<Error>) -> Self {
    Error::Context {
      frame: frame.into(),
      source: Box::new(source.into()),
    }
  }

  /// The innermost error, skipping context frames and shared wrappers.
  pub fn root_cause(&self) -> &Error {
    match self {
      Error::Context { source, .. } => source.root_cause(),
      Error::Shared(inner) => inner.root_cause(),
      other => other,
    }
  }

  /// Context frames from outermost to innermost.
  pub fn frames(&self) -> Vec<&str> {
    let mut frames = Vec::new();
    let mut current = self;
    loop {
      match current {
        Error::Context { frame, source } => {
          frames.push(frame.as_str());
          current = source;
        }
        Error::Shared(inner) => current = inner,
        _ => return frames,
      }
    }
  }

  pub fn as_build_error(&self) -> Option<&BuildError> {
    match self.root_cause() {
      Error::Build(err) => Some(err),
      _ => None,
    }
  }

  /// True when the failure is a cancellation caused by another branch failing.
  pub fn is_cancelled(&self) -> bool {
    matches!(self.as_build_error(), Some(BuildError::Cancelled))
  }
}

/// Appends context frames to fallible results.
pub trait ResultExt<T> {
  fn frame<F: FnOnce() -> String>(self, frame: F) -> Result<T, Error>;
}

impl<T, E: Into<Error>> ResultExt<T> for Result<T, E> {
  fn frame<F: FnOnce() -> String>(self, frame: F) -> Result<T, Error> {
    self.map_err(|e| Error::context(frame(), e))
  }
}
