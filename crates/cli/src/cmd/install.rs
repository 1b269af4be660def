//! `esy install`: resolve the sandbox and write the lock file.

use anyhow::Result;

use esy_lib::sandbox;

use super::Session;
use crate::output::{print_stat, print_success};

pub fn cmd_install(session: &Session) -> Result<()> {
  let ctx = session.context()?;
  let report = sandbox::install(&ctx)?;

  print_success(&format!("Installed {} package(s)", report.lock.node.len()));
  print_stat("Lock file", &ctx.lock_path().display().to_string());
  Ok(())
}
