//! Rendered build plans.
//!
//! A [`BuildPlan`] is a task with every placeholder expanded and its build
//! environment composed: exactly what the executor runs, and what
//! `esy build-plan` prints.

use std::path::PathBuf;

use petgraph::graph::NodeIndex;
use serde::{Serialize, Serializer};

use super::{BuildTask, TaskGraph};
use crate::env::{EnvComposer, Environment};
use crate::error::{Error, ResultExt};
use crate::manifest::{Command, CommandList};
use crate::sandbox::SourceKind;
use crate::scope::{Flavor, Globals, TaskScope};
use crate::store::StoreManager;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPlan {
  pub id: String,
  pub name: String,
  pub version: String,
  pub source_type: &'static str,
  pub build_type: &'static str,
  pub source_path: PathBuf,
  /// Directory the commands run in.
  pub root_path: PathBuf,
  pub build_path: PathBuf,
  pub stage_path: PathBuf,
  pub install_path: PathBuf,
  #[serde(serialize_with = "commands_as_args")]
  pub build: Vec<Command>,
  #[serde(serialize_with = "commands_as_args")]
  pub install: Vec<Command>,
  #[serde(serialize_with = "env_as_object")]
  pub env: Environment,
}

impl BuildPlan {
  /// Render the plan of the task at `idx`.
  pub fn render(graph: &TaskGraph, stores: &StoreManager, globals: &Globals, idx: NodeIndex) -> Result<Self, Error> {
    let task = graph.task(idx);
    let scope = TaskScope::new(graph, stores, globals, idx, Flavor::Building);
    let env = EnvComposer::new(graph, stores, globals).build_env(idx)?;
    let entry = stores.entry(task);

    let build = render_commands(&scope, &env, &task.build).frame(|| format!("rendering build commands of {}", task.label()))?;
    let install =
      render_commands(&scope, &env, &task.install).frame(|| format!("rendering install commands of {}", task.label()))?;

    Ok(Self {
      id: task.id.to_string(),
      name: task.name.clone(),
      version: task.version.clone(),
      source_type: source_type(task),
      build_type: if task.builds_in_source {
        "in-source"
      } else {
        "out-of-source"
      },
      source_path: task.source_path.clone(),
      root_path: scope.this.root.clone(),
      build_path: entry.build_dir,
      stage_path: entry.stage_dir,
      install_path: entry.install_dir,
      build,
      install,
      env,
    })
  }

  pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(self)
  }
}

fn source_type(task: &BuildTask) -> &'static str {
  match task.kind {
    SourceKind::Root => "root",
    SourceKind::Linked => "transient",
    SourceKind::Immutable => "immutable",
  }
}

/// Expand placeholders in every command. Argument lists also get `$NAME`
/// references expanded, since no shell will see them.
fn render_commands(scope: &TaskScope, env: &Environment, list: &CommandList) -> Result<Vec<Command>, Error> {
  list
    .0
    .iter()
    .map(|cmd| -> Result<Command, Error> {
      let rendered = cmd.try_map(|s| scope.render(s))?;
      Ok(match rendered {
        Command::Args(args) => Command::Args(args.iter().map(|a| env.expand(a)).collect()),
        shell => shell,
      })
    })
    .collect()
}

fn commands_as_args<S: Serializer>(commands: &[Command], serializer: S) -> Result<S::Ok, S::Error> {
  serializer.collect_seq(commands.iter().map(Command::to_args))
}

fn env_as_object<S: Serializer>(env: &Environment, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.collect_map(env.iter().map(|v| (&v.name, &v.value)))
}
