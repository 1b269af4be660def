//! Per-task placeholder scopes.
//!
//! A [`TaskScope`] holds the path fields of one task and of its direct
//! dependencies, plus host globals. [`EsyScope`] and [`OpamScope`] expose it
//! through the two placeholder syntaxes.
//!
//! Paths depend on the store tier of each package and, for the task being
//! built, on whether installs go to the stage dir (`s/<id>`) or the final
//! install dir (`i/<id>`).

use std::path::{Path, PathBuf};

use petgraph::graph::NodeIndex;

use crate::placeholder::{PlaceholderError, Scope, substitute};
use crate::plan::{BuildTask, TaskGraph};
use crate::platform::Platform;
use crate::store::StoreManager;

/// Which install dir a scope points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
  /// The task is being built: `install` is the stage dir.
  Building,
  /// The task is installed: `install` is the final dir.
  Final,
}

/// Host values shared by every scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Globals {
  pub jobs: usize,
  pub platform: Platform,
}

/// The fields of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageScope {
  pub name: String,
  pub version: String,
  pub id: String,
  /// Where the build runs: the build dir for in-source builds, the sources otherwise.
  pub root: PathBuf,
  pub original_root: PathBuf,
  pub target_dir: PathBuf,
  pub install: PathBuf,
  pub dev: bool,
}

impl PackageScope {
  pub fn new(task: &BuildTask, stores: &StoreManager, flavor: Flavor) -> Self {
    let entry = stores.entry(task);
    let install = match flavor {
      Flavor::Building => entry.stage_dir,
      Flavor::Final => entry.install_dir,
    };
    let root = if task.builds_in_source {
      entry.build_dir.clone()
    } else {
      task.source_path.clone()
    };
    Self {
      name: task.name.clone(),
      version: task.version.clone(),
      id: task.id.to_string(),
      root,
      original_root: task.source_path.clone(),
      target_dir: entry.build_dir,
      install,
      dev: task.is_mutable(),
    }
  }

  fn sub(&self, rel: &str) -> PathBuf {
    self.install.join(rel)
  }

  /// Esy fields: `#{<pkg>.<field>}` and `cur__<field>`.
  pub fn field(&self, field: &str) -> Option<String> {
    let path = match field {
      "name" => return Some(self.name.clone()),
      "version" => return Some(self.version.clone()),
      "id" => return Some(self.id.clone()),
      "root" => self.root.clone(),
      "original_root" => self.original_root.clone(),
      "target_dir" => self.target_dir.clone(),
      "install" => self.install.clone(),
      "bin" => self.sub("bin"),
      "sbin" => self.sub("sbin"),
      "lib" => self.sub("lib"),
      "man" => self.sub("man"),
      "doc" => self.sub("doc"),
      "stublibs" => self.sub("lib/stublibs"),
      "toplevel" => self.sub("lib/toplevel"),
      "share" => self.sub("share"),
      "etc" => self.sub("etc"),
      _ => return None,
    };
    Some(display(&path))
  }

  /// Every esy field, in the order `cur__*` variables are emitted.
  pub fn fields(&self) -> Vec<(&'static str, String)> {
    const FIELDS: &[&str] = &[
      "name",
      "version",
      "root",
      "original_root",
      "target_dir",
      "install",
      "bin",
      "sbin",
      "lib",
      "man",
      "doc",
      "stublibs",
      "toplevel",
      "share",
      "etc",
    ];
    FIELDS
      .iter()
      .filter_map(|f| self.field(f).map(|v| (*f, v)))
      .collect()
  }

  /// Name without the `@opam/` prefix.
  pub fn opam_name(&self) -> &str {
    self.name.strip_prefix("@opam/").unwrap_or(&self.name)
  }

  /// Opam package variables: `%{<pkg>:<field>}%`.
  pub fn opam_field(&self, field: &str) -> Option<String> {
    let name = self.opam_name();
    let path = match field {
      "name" => return Some(name.to_string()),
      "version" => return Some(self.version.clone()),
      "depends" => return Some(String::new()),
      "installed" => return Some("true".to_string()),
      "enable" => return Some("enable".to_string()),
      "pinned" => return Some(self.dev.to_string()),
      "dev" => return Some(self.dev.to_string()),
      "build-id" => return Some(self.id.clone()),
      "hash" => return Some(self.id.rsplit('-').next().unwrap_or_default().to_string()),
      "build" => self.target_dir.clone(),
      "bin" => self.sub("bin"),
      "sbin" => self.sub("sbin"),
      "lib" => self.sub("lib").join(name),
      "lib_root" => self.sub("lib"),
      "libexec" => self.sub("lib").join(name),
      "libexec_root" => self.sub("lib"),
      "man" => self.sub("man"),
      "doc" => self.sub("doc").join(name),
      "share" => self.sub("share").join(name),
      "share_root" => self.sub("share"),
      "etc" => self.sub("etc").join(name),
      "toplevel" => self.sub("lib/toplevel"),
      "stublibs" => self.sub("lib/stublibs"),
      _ => return None,
    };
    Some(display(&path))
  }
}

fn display(path: &Path) -> String {
  path.to_string_lossy().to_string()
}

/// Everything a task's placeholders may reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskScope {
  pub this: PackageScope,
  /// Direct dependencies of every kind, in declaration order.
  pub deps: Vec<PackageScope>,
  pub globals: Globals,
}

impl TaskScope {
  pub fn new(graph: &TaskGraph, stores: &StoreManager, globals: &Globals, idx: NodeIndex, flavor: Flavor) -> Self {
    let deps = graph
      .edges(idx)
      .into_iter()
      .map(|(dep, _)| PackageScope::new(graph.task(dep), stores, Flavor::Final))
      .collect();
    Self {
      this: PackageScope::new(graph.task(idx), stores, flavor),
      deps,
      globals: globals.clone(),
    }
  }

  pub fn esy(&self) -> EsyScope<'_> {
    EsyScope(self)
  }

  pub fn opam(&self) -> OpamScope<'_> {
    OpamScope(self)
  }

  /// Expand both placeholder syntaxes in `input`.
  pub fn render(&self, input: &str) -> Result<String, PlaceholderError> {
    substitute(input, &self.esy(), &self.opam())
  }

  fn dep(&self, name: &str) -> Option<&PackageScope> {
    self.deps.iter().find(|d| d.name == name)
  }
}

/// `#{self.bin}`, `#{dep.lib}`, `#{os}`.
pub struct EsyScope<'a>(&'a TaskScope);

impl Scope for EsyScope<'_> {
  fn lookup(&self, namespace: Option<&str>, field: &str) -> Option<String> {
    let scope = self.0;
    match namespace {
      Some("self") => scope.this.field(field),
      Some(name) => scope.dep(name).and_then(|d| d.field(field)),
      None => match field {
        "os" => Some(scope.globals.platform.os.as_str().to_string()),
        "arch" => Some(scope.globals.platform.arch.as_str().to_string()),
        "jobs" => Some(scope.globals.jobs.to_string()),
        _ => None,
      },
    }
  }
}

/// `%{prefix}%`, `%{_:lib}%`, `%{dep:installed}%`.
pub struct OpamScope<'a>(&'a TaskScope);

impl OpamScope<'_> {
  fn global(&self, field: &str) -> Option<String> {
    let scope = self.0;
    let this = &scope.this;
    let platform = &scope.globals.platform;
    let value = match field {
      "prefix" => display(&this.install),
      "lib" => display(&this.sub("lib")),
      "libexec" => display(&this.sub("lib")),
      "bin" => display(&this.sub("bin")),
      "sbin" => display(&this.sub("sbin")),
      "man" => display(&this.sub("man")),
      "doc" => display(&this.sub("doc")),
      "share" => display(&this.sub("share")),
      "etc" => display(&this.sub("etc")),
      "toplevel" => display(&this.sub("lib/toplevel")),
      "stublibs" => display(&this.sub("lib/stublibs")),
      "jobs" => scope.globals.jobs.to_string(),
      "make" => "make".to_string(),
      "arch" => platform.arch.as_str().to_string(),
      "os" => platform.os.as_str().to_string(),
      "os-distribution" => platform.release.distribution.clone(),
      "os-family" => platform.release.family.clone(),
      "os-version" => platform.release.version.clone(),
      _ => return this.opam_field(field),
    };
    Some(value)
  }
}

impl Scope for OpamScope<'_> {
  fn lookup(&self, namespace: Option<&str>, field: &str) -> Option<String> {
    let scope = self.0;
    match namespace {
      None => self.global(field),
      Some("_") => scope.this.opam_field(field),
      Some(name) if name == scope.this.opam_name() || name == scope.this.name => scope.this.opam_field(field),
      Some(name) => match scope.deps.iter().find(|d| d.opam_name() == name || d.name == name) {
        Some(dep) => dep.opam_field(field),
        None => match field {
          "installed" => Some("false".to_string()),
          "enable" => Some("disable".to_string()),
          _ => None,
        },
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::arch::Arch;
  use crate::platform::os::{Os, OsRelease};
  use crate::plan::BuildMode;
  use crate::sandbox::SourceKind;
  use crate::util::testutil::SolutionBuilder;

  fn globals() -> Globals {
    Globals {
      jobs: 4,
      platform: Platform {
        arch: Arch::X86_64,
        os: Os::Linux,
        release: OsRelease {
          distribution: "debian".into(),
          family: "debian".into(),
          version: "12".into(),
        },
      },
    }
  }

  fn setup() -> (TaskGraph, StoreManager) {
    let solution = SolutionBuilder::new("root")
      .dep("root", "@opam/dune")
      .dep("root", "linked")
      .kind("linked", SourceKind::Linked)
      .path("root", Path::new("/project"))
      .build();
    let graph = TaskGraph::build(&solution, BuildMode::Dev).unwrap();
    (graph, StoreManager::new("/prefix/3", "/project/_esy/default/store"))
  }

  #[test]
  fn building_scope_installs_into_stage_dir() {
    let (graph, stores) = setup();
    let scope = TaskScope::new(&graph, &stores, &globals(), graph.root(), Flavor::Building);
    let id = &graph.root_task().id;

    assert_eq!(
      scope.render("#{self.bin}").unwrap(),
      format!("/project/_esy/default/store/s/{id}/bin")
    );
    assert_eq!(scope.render("#{self.root}").unwrap(), "/project");
    assert_eq!(
      scope.render("#{self.target_dir}").unwrap(),
      format!("/project/_esy/default/store/b/{id}")
    );
  }

  #[test]
  fn dependency_paths_follow_their_tier() {
    let (graph, stores) = setup();
    let scope = TaskScope::new(&graph, &stores, &globals(), graph.root(), Flavor::Building);
    let dune = graph.task(graph.find("@opam/dune").unwrap());
    let linked = graph.task(graph.find("linked").unwrap());

    assert_eq!(
      scope.render("#{@opam/dune.lib}").unwrap(),
      format!("/prefix/3/i/{}/lib", dune.id)
    );
    assert_eq!(
      scope.render("#{linked.install}").unwrap(),
      format!("/project/_esy/default/store/i/{}", linked.id)
    );
  }

  #[test]
  fn in_source_builds_use_build_dir_as_root() {
    let (graph, stores) = setup();
    let mut task = graph.root_task().clone();
    task.builds_in_source = true;
    let scope = PackageScope::new(&task, &stores, Flavor::Final);

    assert_eq!(scope.root, stores.entry(&task).build_dir);
    assert_eq!(scope.original_root, PathBuf::from("/project"));
  }

  #[test]
  fn opam_variables() {
    let (graph, stores) = setup();
    let scope = TaskScope::new(&graph, &stores, &globals(), graph.root(), Flavor::Final);
    let dune = graph.task(graph.find("@opam/dune").unwrap());

    assert_eq!(scope.render("%{dune:installed}%").unwrap(), "true");
    assert_eq!(scope.render("%{dune:lib}%").unwrap(), format!("/prefix/3/i/{}/lib/dune", dune.id));
    assert_eq!(scope.render("%{lwt:installed}%").unwrap(), "false");
    assert_eq!(scope.render("%{lwt:enable}%").unwrap(), "disable");
    assert_eq!(scope.render("%{_:name}%").unwrap(), "root");
    assert_eq!(scope.render("-j%{jobs}% %{os}%-%{os-family}%").unwrap(), "-j4 linux-debian");
    assert!(scope.render("%{lwt:lib}%").is_err());
  }

  #[test]
  fn cur_fields_cover_every_esy_field() {
    let (graph, stores) = setup();
    let scope = PackageScope::new(graph.root_task(), &stores, Flavor::Final);
    let names: Vec<&str> = scope.fields().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names.len(), 15);
    assert!(names.contains(&"stublibs"));
    assert_eq!(scope.field("unknown"), None);
  }
}
