//! `esy export-build`, `esy export-dependencies` and `esy import-build`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use esy_lib::consts::EXPORT_DIR;
use esy_lib::plan::TaskId;
use esy_lib::store::{Store, archive};

use super::{Session, mode};
use crate::output::{print_info, print_stat, print_success, print_warning};

/// Export the install directory at `path` (`<store>/i/<id>`).
pub fn cmd_export_build(session: &Session, path: &Path) -> Result<()> {
  let id = archive::id_of_export(path).with_context(|| format!("Not a build path: {}", path.display()))?;
  let store_root = path
    .parent()
    .and_then(Path::parent)
    .with_context(|| format!("Not a store path: {}", path.display()))?;

  let out = archive::export(&Store::new(store_root), &id, &export_dir(session))?;
  print_success(&format!("Exported {id}"));
  print_stat("Archive", &out.display().to_string());
  Ok(())
}

/// Export every built dependency of the root.
pub fn cmd_export_dependencies(session: &Session, release: bool) -> Result<()> {
  let project = session.project(mode(release))?;
  let out_dir = project.ctx.project_root.join(EXPORT_DIR);

  let mut exported = 0;
  for idx in project.all_dependencies() {
    let task = project.graph.task(idx);
    if !project.stores.is_built(task) {
      print_warning(&format!("{} is not built, skipping", task.label()));
      continue;
    }
    archive::export(project.stores.store(task.tier), &task.id, &out_dir)?;
    exported += 1;
  }

  if exported == 0 {
    print_info("No built dependencies to export");
  } else {
    print_success(&format!("Exported {exported} build(s)"));
    print_stat("Directory", &out_dir.display().to_string());
  }
  Ok(())
}

/// Import exports named by `path` or listed, one per line, in `from`.
///
/// Builds of packages in the current sandbox go to that package's store;
/// anything else goes to the global store.
pub fn cmd_import_build(session: &Session, path: Option<&Path>, from: Option<&Path>) -> Result<()> {
  let mut paths: Vec<PathBuf> = path.map(Path::to_path_buf).into_iter().collect();
  if let Some(list) = from {
    let content = std::fs::read_to_string(list).with_context(|| format!("Failed to read {}", list.display()))?;
    paths.extend(
      content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from),
    );
  }
  if paths.is_empty() {
    bail!("Nothing to import: pass a path or --from <file>");
  }

  let ctx = session.context().ok();
  let config = session.config(ctx.as_ref())?;
  let project = match ctx {
    Some(ctx) => esy_lib::Project::load(ctx, config.clone(), mode(false)).ok(),
    None => None,
  };
  let global = Store::new(config.global_store_root());

  for path in &paths {
    let store = archive::id_of_export(path)
      .and_then(|id| {
        let project = project.as_ref()?;
        let idx = project.graph.index_of(&id)?;
        Some(project.stores.store(project.graph.task(idx).tier).clone())
      })
      .unwrap_or_else(|| global.clone());
    let id: TaskId = archive::import(&store, path)?;
    print_success(&format!("Imported {id}"));
  }
  Ok(())
}

fn export_dir(session: &Session) -> PathBuf {
  let root = session
    .context()
    .map(|ctx| ctx.project_root)
    .unwrap_or_else(|_| session.cwd.clone());
  root.join(EXPORT_DIR)
}
