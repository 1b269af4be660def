//! `esy status`: report whether the sandbox is installed and built.

use anyhow::Result;

use esy_lib::project::ProjectStatus;

use super::Session;
use crate::output::{print_info, print_json, print_stat, print_success};

pub fn cmd_status(session: &Session, json: bool) -> Result<()> {
  let ctx = session.context().ok();
  let config = session.config(ctx.as_ref())?;
  let status = ProjectStatus::inspect(ctx.as_ref(), &config);

  if json {
    return print_json(&status);
  }

  if !status.is_project {
    print_info("No esy project found");
    return Ok(());
  }

  print_success("esy project");
  let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
  print_stat("Solved", &yes_no(status.is_project_solved));
  print_stat("Fetched", &yes_no(status.is_project_fetched));
  print_stat("Ready for dev", &yes_no(status.is_project_ready_for_dev));
  if let Some(path) = &status.root_package_config_path {
    print_stat("Manifest", &path.display().to_string());
  }
  if let Some(path) = &status.root_install_path {
    print_stat("Install path", &path.display().to_string());
  }
  Ok(())
}
