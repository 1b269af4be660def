//! `esy build-env`, `esy command-env` and `esy exec-env`.

use anyhow::Result;

use super::{Session, mode};
use crate::output::print_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
  Build,
  Command,
  Exec,
}

pub fn cmd_env(session: &Session, kind: EnvKind, json: bool, release: bool, package: Option<&str>) -> Result<()> {
  let project = session.project(mode(release))?;
  let idx = project.select(package)?;
  let composer = project.composer();
  let env = match kind {
    EnvKind::Build => composer.build_env(idx)?,
    EnvKind::Command => composer.command_env(idx)?,
    EnvKind::Exec => composer.exec_env(idx)?,
  };

  if json {
    print_json(&env.to_json())?;
  } else {
    print!("{}", env.render_shell());
  }
  Ok(())
}
