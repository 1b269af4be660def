//! `esy build` and `esy build-dependencies`.

use std::time::Instant;

use anyhow::Result;

use esy_lib::Project;
use esy_lib::build::{BuildOptions, BuildReport};
use esy_lib::plan::NodeIndex;

use super::{Session, block_on, mode};
use crate::output::{format_duration, print_info, print_stat, print_success};

pub fn cmd_build(session: &Session, release: bool, skip_staleness_check: bool, force: bool) -> Result<()> {
  let project = session.project(mode(release))?;
  let options = BuildOptions {
    skip_staleness_check,
    force_local: force,
    ..project.build_options()
  };
  let root = project.graph.root();
  build_targets(&project, options, &[root])?;
  Ok(())
}

pub fn cmd_build_dependencies(session: &Session, all: bool, dev_dependencies: bool, release: bool) -> Result<()> {
  let project = session.project(mode(release))?;
  let targets = if all {
    project.all_dependencies()
  } else {
    project.root_dependencies(dev_dependencies)
  };
  if targets.is_empty() {
    print_info("No dependencies to build");
    return Ok(());
  }
  build_targets(&project, project.build_options(), &targets)?;
  Ok(())
}

/// Build `targets` and print a summary.
fn build_targets(project: &Project, options: BuildOptions, targets: &[NodeIndex]) -> Result<BuildReport> {
  let started = Instant::now();
  let executor = project.executor(options);
  let report = block_on(executor.build(targets))??;

  print_success(&format!("Build complete in {}", format_duration(started.elapsed())));
  print_stat("Built", &report.built.len().to_string());
  print_stat("Cached", &report.cached.len().to_string());
  if !report.imported.is_empty() {
    print_stat("Imported", &report.imported.len().to_string());
  }
  Ok(report)
}
