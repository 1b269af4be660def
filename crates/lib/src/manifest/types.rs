//! Package manifest types.
//!
//! A package manifest is a `package.json` (or `esy.json`) whose `esy` section
//! describes how to build and install the package:
//!
//! ```json
//! {
//!   "name": "dep",
//!   "version": "1.0.0",
//!   "esy": {
//!     "build": "cp #{self.name}.exe #{self.target_dir / self.name}.exe",
//!     "install": [["cp", "#{self.target_dir / self.name}.exe", "#{self.bin / self.name}.exe"]],
//!     "exportedEnv": { "DEP_HOME": { "val": "#{self.install}", "scope": "global" } }
//!   },
//!   "dependencies": { "other": "link:../other" }
//! }
//! ```
//!
//! Unknown top-level fields are ignored; the `esy` section is optional.

use serde::{Deserialize, Serialize};

use super::OrderedMap;

/// A parsed `package.json` / `esy.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,

  #[serde(default)]
  pub dependencies: OrderedMap<String>,

  #[serde(default)]
  pub dev_dependencies: OrderedMap<String>,

  #[serde(default)]
  pub opt_dependencies: OrderedMap<String>,

  /// Dependencies needed only while building (tools); their exports reach the
  /// direct consumer's build environment and nothing further.
  #[serde(default)]
  pub build_dependencies: OrderedMap<String>,

  /// Root-level source pins, optionally carrying an override record.
  #[serde(default)]
  pub resolutions: OrderedMap<serde_json::Value>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub esy: Option<EsyConfig>,
}

impl PackageManifest {
  pub fn esy_config(&self) -> EsyConfig {
    self.esy.clone().unwrap_or_default()
  }

  pub fn esy_config_mut(&mut self) -> &mut EsyConfig {
    self.esy.get_or_insert_with(EsyConfig::default)
  }
}

/// The `esy` section of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsyConfig {
  #[serde(default)]
  pub build: CommandList,

  /// Alternate build commands used for the root package in dev mode.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub build_dev: Option<CommandList>,

  #[serde(default)]
  pub install: CommandList,

  #[serde(default)]
  pub builds_in_source: bool,

  #[serde(default)]
  pub build_env: OrderedMap<String>,

  #[serde(default)]
  pub exported_env: OrderedMap<ExportedVar>,

  #[serde(default)]
  pub sandbox_env: OrderedMap<String>,
}

/// One exported environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedVar {
  pub val: String,
  #[serde(default)]
  pub scope: ExportScope,
}

impl ExportedVar {
  pub fn new(val: impl Into<String>, scope: ExportScope) -> Self {
    Self { val: val.into(), scope }
  }
}

/// How far an exported variable propagates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
  /// Visible to direct consumers only.
  #[default]
  Local,
  /// Visible to every transitive consumer.
  Global,
}

/// A single build or install command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
  /// Run through the shell (`sh -c`).
  Shell(String),
  /// Run directly; the first element is the program.
  Args(Vec<String>),
}

impl Command {
  /// Apply `f` to every string in the command, keeping its shape.
  pub fn try_map<E>(&self, mut f: impl FnMut(&str) -> Result<String, E>) -> Result<Command, E> {
    Ok(match self {
      Command::Shell(s) => Command::Shell(f(s)?),
      Command::Args(args) => Command::Args(args.iter().map(|a| f(a)).collect::<Result<_, _>>()?),
    })
  }

  /// The command as an argument list, for display and build plans.
  pub fn to_args(&self) -> Vec<String> {
    match self {
      Command::Shell(s) => vec![s.clone()],
      Command::Args(args) => args.clone(),
    }
  }
}

impl std::fmt::Display for Command {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Command::Shell(s) => f.write_str(s),
      Command::Args(args) => f.write_str(&args.join(" ")),
    }
  }
}

/// An ordered list of commands.
///
/// Accepts a single string, a list of strings, or a list mixing strings and
/// argument arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawCommandList")]
pub struct CommandList(pub Vec<Command>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCommandList {
  Null(()),
  One(String),
  Many(Vec<Command>),
}

impl From<RawCommandList> for CommandList {
  fn from(raw: RawCommandList) -> Self {
    match raw {
      RawCommandList::Null(()) => CommandList::default(),
      RawCommandList::One(s) => CommandList(vec![Command::Shell(s)]),
      RawCommandList::Many(cmds) => CommandList(cmds),
    }
  }
}

impl CommandList {
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Command> {
    self.0.iter()
  }
}
