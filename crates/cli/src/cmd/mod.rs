mod build;
mod env;
mod exec;
mod export;
mod install;
mod plan;
mod status;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};

use esy_lib::Project;
use esy_lib::config::Config;
use esy_lib::plan::BuildMode;
use esy_lib::sandbox::SandboxContext;

pub use build::{cmd_build, cmd_build_dependencies};
pub use env::{EnvKind, cmd_env};
pub use exec::{cmd_b, cmd_command, cmd_x};
pub use export::{cmd_export_build, cmd_export_dependencies, cmd_import_build};
pub use install::cmd_install;
pub use plan::cmd_build_plan;
pub use status::cmd_status;

/// Invocation-wide inputs: where esy was started and which sandbox was named.
pub struct Session {
  pub cwd: PathBuf,
  pub sandbox: Option<String>,
}

impl Session {
  pub fn context(&self) -> Result<SandboxContext> {
    Ok(SandboxContext::discover(&self.cwd, self.sandbox.as_deref())?)
  }

  pub fn config(&self, ctx: Option<&SandboxContext>) -> Result<Config> {
    let root = ctx.map_or(self.cwd.as_path(), |ctx| ctx.project_root.as_path());
    Ok(Config::load(root)?)
  }

  /// Load the sandbox, installing it first if the lock is out of date.
  pub fn project(&self, mode: BuildMode) -> Result<Project> {
    let ctx = self.context()?;
    let config = self.config(Some(&ctx))?;
    Ok(Project::load(ctx, config, mode)?)
  }
}

pub fn mode(release: bool) -> BuildMode {
  if release { BuildMode::Release } else { BuildMode::Dev }
}

/// Run a future to completion on a fresh runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  Ok(rt.block_on(future))
}
