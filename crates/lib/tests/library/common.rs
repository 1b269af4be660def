use std::path::{Path, PathBuf};

use esy_lib::Project;
use esy_lib::config::Config;
use esy_lib::plan::BuildMode;
use esy_lib::sandbox::SandboxContext;
use tempfile::TempDir;

/// A temp directory holding projects and one shared store prefix.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self, rel: &str) -> PathBuf {
    self.temp.path().join(rel)
  }

  pub fn write(&self, rel: &str, content: &str) {
    let path = self.path(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
  }

  pub fn write_json(&self, rel: &str, value: serde_json::Value) {
    self.write(rel, &serde_json::to_string_pretty(&value).unwrap());
  }

  pub fn config(&self) -> Config {
    let mut config = Config::with_prefix(self.path("prefix"));
    config.build_concurrency = 2;
    config
  }

  pub fn load(&self, project: &str) -> Project {
    let ctx = SandboxContext::discover(&self.path(project), None).unwrap();
    Project::load(ctx, self.config(), BuildMode::Dev).unwrap()
  }
}

/// Read a file, trimming trailing whitespace.
pub fn read(path: &Path) -> String {
  std::fs::read_to_string(path).unwrap().trim_end().to_string()
}
