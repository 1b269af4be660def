//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the project and the
/// global store prefix.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create an empty test environment.
  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// A project `app` whose build depends on the linked package `dep`.
  ///
  /// `dep` installs `bin/hello-dep`, a script printing `marker`.
  pub fn with_linked_dep(marker: &str) -> Self {
    let env = Self::empty();
    env.write_file(
      "app/package.json",
      r#"{
  "name": "app",
  "version": "0.1.0",
  "esy": { "build": "true" },
  "dependencies": { "dep": "link:./dep" }
}"#,
    );
    env.write_file(
      "app/dep/package.json",
      r#"{
  "name": "dep",
  "version": "1.0.0",
  "esy": { "build": "cp #{self.root}/hello.sh #{self.bin}/hello-dep" }
}"#,
    );
    env.write_hello(marker);
    env
  }

  /// Rewrite `dep`'s script to print `marker`.
  pub fn write_hello(&self, marker: &str) {
    self.write_file("app/dep/hello.sh", &format!("#!/bin/sh\necho {marker}\n"));
    make_executable(&self.temp.path().join("app/dep/hello.sh"));
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// The project directory.
  pub fn project_path(&self) -> PathBuf {
    let p = self.temp.path().join("app");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Global store prefix (isolated per test).
  pub fn prefix_path(&self) -> PathBuf {
    let p = self.temp.path().join("prefix");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Get a pre-configured Command for the esy binary, run from the project.
  ///
  /// Sets `ESY__PREFIX` so nothing touches the user's store.
  pub fn esy_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("esy");
    cmd.current_dir(self.project_path());
    cmd.env("ESY__PREFIX", self.prefix_path());
    cmd.env("ESY__BUILD_CONCURRENCY", "2");
    cmd.env_remove("ESY_LOG");
    cmd
  }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
  use std::os::unix::fs::PermissionsExt;
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}
