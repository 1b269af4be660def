//! `esy build-plan`: print the rendered plan of one package.

use anyhow::Result;

use esy_lib::plan::BuildMode;
use esy_lib::plan::export::BuildPlan;

use super::Session;
use crate::output::print_json;

pub fn cmd_build_plan(session: &Session, package: Option<&str>) -> Result<()> {
  let project = session.project(BuildMode::Dev)?;
  let idx = project.select(package)?;
  let plan = BuildPlan::render(&project.graph, &project.stores, &project.globals, idx)?;
  print_json(&plan)
}
