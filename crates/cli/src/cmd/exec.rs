//! Running commands inside a sandbox environment: `esy x`, `esy b` and
//! `esy <cmd>`.
//!
//! The composed environment is layered over the invoking environment, so
//! variables like `HOME` and `TERM` stay visible to interactive tools.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::debug;

use esy_lib::Project;
use esy_lib::env::Environment;
use esy_lib::plan::{BuildMode, NodeIndex};

use super::{Session, block_on};

/// Build the root, then run `command` in its exec environment.
pub fn cmd_x(session: &Session, command: &[String]) -> Result<ExitCode> {
  let project = session.project(BuildMode::Dev)?;
  let root = project.graph.root();
  build_quietly(&project, &[root])?;
  let env = project.composer().exec_env(root)?;
  run_in(&env, command, &session.cwd)
}

/// Build the root's dependencies, then run `command` in the root build
/// environment from the project root.
pub fn cmd_b(session: &Session, command: &[String]) -> Result<ExitCode> {
  let project = session.project(BuildMode::Dev)?;
  build_quietly(&project, &project.root_dependencies(false))?;
  let env = project.composer().build_env(project.graph.root())?;
  run_in(&env, command, &project.ctx.project_root)
}

/// Build the root's dependencies including dev ones, then run `command` in
/// the root command environment.
pub fn cmd_command(session: &Session, command: &[String]) -> Result<ExitCode> {
  let project = session.project(BuildMode::Dev)?;
  build_quietly(&project, &project.root_dependencies(true))?;
  let env = project.composer().command_env(project.graph.root())?;
  run_in(&env, command, &session.cwd)
}

fn build_quietly(project: &Project, targets: &[NodeIndex]) -> Result<()> {
  if targets.is_empty() {
    return Ok(());
  }
  let executor = project.executor(project.build_options());
  block_on(executor.build(targets))??;
  Ok(())
}

fn run_in(env: &Environment, command: &[String], cwd: &Path) -> Result<ExitCode> {
  let (program, args) = command.split_first().context("No command given")?;
  debug!(program = %program, cwd = ?cwd, "running command");

  let status = std::process::Command::new(program)
    .args(args)
    .current_dir(cwd)
    .envs(env.to_pairs())
    .status()
    .with_context(|| format!("Failed to run {program}"))?;

  Ok(match status.code() {
    Some(0) => ExitCode::SUCCESS,
    Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
    None => ExitCode::FAILURE,
  })
}
