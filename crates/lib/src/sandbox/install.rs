//! Local installation.
//!
//! Resolves the sandbox's dependency tree from sources available on disk and
//! writes the lock file and installation map. Only these sources resolve:
//!
//! - `link:<path>`: a mutable source tree, staleness-checked on every build
//! - `path:<path>` or a bare relative/absolute path: an immutable source tree
//! - `no-source:`: a package with no sources (build commands only)
//! - a range whose package already sits in `node_modules/<name>`
//!
//! Anything else needs a registry and fails with [`ManifestError::Unresolved`].
//! Each package name resolves once; later requests reuse the first resolution.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, ResultExt};
use crate::manifest::{self, ManifestError, OrderedMap, PackageManifest};
use crate::sandbox::context::SandboxContext;
use crate::sandbox::lock::{InstallEntry, InstallKind, Installation, LockFile, LockNode};
use crate::sandbox::overrides::Override;
use crate::sandbox::{load_sandbox_manifest, solve_hash};
use crate::util::hash::hash_bytes;

/// Outcome of [`install`].
#[derive(Debug, Clone)]
pub struct InstallReport {
  pub lock: LockFile,
  pub installation: Installation,
}

/// Resolve the sandbox and persist the lock file and installation map.
pub fn install(ctx: &SandboxContext) -> Result<InstallReport, Error> {
  let root_manifest = load_sandbox_manifest(&ctx.root_manifest_path)
    .frame(|| format!("reading package metadata from {}", ctx.root_manifest_path.display()))?;

  let mut resolver = Resolver {
    ctx,
    resolutions: &root_manifest.resolutions,
    nodes: BTreeMap::new(),
    installation: Installation::default(),
    by_name: HashMap::new(),
  };
  let root = resolver.add_root(&root_manifest)?;

  let lock = LockFile {
    hash: solve_hash(&root_manifest)?,
    root,
    node: resolver.nodes,
  };
  lock.save(&ctx.lock_path())?;
  resolver.installation.save(&ctx.installation_path())?;

  info!(packages = lock.node.len(), sandbox = %ctx.sandbox_name, "installed");
  Ok(InstallReport {
    lock,
    installation: resolver.installation,
  })
}

/// Id of a package in the lock file: `<name>@<version>@<source hash>`.
pub fn package_id(name: &str, version: &str, source: &str) -> String {
  let hash = hash_bytes(source.as_bytes()).0;
  format!("{name}@{version}@{}", &hash[..8])
}

struct Located {
  kind: InstallKind,
  path: PathBuf,
  source: String,
  has_manifest: bool,
}

struct Resolver<'a> {
  ctx: &'a SandboxContext,
  resolutions: &'a OrderedMap<serde_json::Value>,
  nodes: BTreeMap<String, LockNode>,
  installation: Installation,
  by_name: HashMap<String, String>,
}

impl Resolver<'_> {
  fn add_root(&mut self, manifest: &PackageManifest) -> Result<String, Error> {
    let name = manifest.name.clone().unwrap_or_else(|| "root".to_string());
    let version = manifest.version.clone().unwrap_or_else(|| "0.0.0".to_string());
    let file_name = self
      .ctx
      .root_manifest_path
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default();
    let source = format!("link-dev:./{file_name}");
    let id = package_id(&name, &version, &source);

    self.by_name.insert(name.clone(), id.clone());
    self.installation.0.insert(
      id.clone(),
      InstallEntry {
        kind: InstallKind::Link,
        path: self.ctx.project_root.clone(),
        source: source.clone(),
      },
    );

    let base = self.ctx.project_root.clone();
    let dependencies = self.resolve_all(&manifest.dependencies, &base)?;
    let build_dependencies = self.resolve_all(&manifest.build_dependencies, &base)?;
    let dev_dependencies = self.resolve_all(&manifest.dev_dependencies, &base)?;
    let mut dependencies = dependencies;
    dependencies.extend(self.resolve_optional(&manifest.opt_dependencies, &base)?);

    self.nodes.insert(
      id.clone(),
      LockNode {
        name,
        version,
        source,
        override_: None,
        dependencies,
        build_dependencies,
        dev_dependencies,
      },
    );
    Ok(id)
  }

  fn resolve_all(&mut self, deps: &OrderedMap<String>, base: &Path) -> Result<Vec<String>, Error> {
    deps.iter().map(|(name, spec)| self.resolve(name, spec, base)).collect()
  }

  fn resolve_optional(&mut self, deps: &OrderedMap<String>, base: &Path) -> Result<Vec<String>, Error> {
    let mut ids = Vec::new();
    for (name, spec) in deps.iter() {
      match self.resolve(name, spec, base) {
        Ok(id) => ids.push(id),
        Err(err) if matches!(err.root_cause(), Error::Manifest(ManifestError::Unresolved { .. })) => {
          debug!(package = %name, "skipping unavailable optional dependency");
        }
        Err(err) => return Err(err),
      }
    }
    Ok(ids)
  }

  fn resolve(&mut self, name: &str, spec: &str, base: &Path) -> Result<String, Error> {
    if let Some(id) = self.by_name.get(name) {
      return Ok(id.clone());
    }

    let (spec, over, base) = match self.resolutions.get(name) {
      Some(value) => {
        let (spec, over) = parse_resolution(name, value)?;
        (spec, over, self.ctx.project_root.clone())
      }
      None => (spec.to_string(), None, base.to_path_buf()),
    };

    let located = self.locate(name, &spec, &base)?;
    let manifest = if located.has_manifest {
      manifest::load_package_dir(&located.path).frame(|| format!("reading package metadata from {}", located.source))?
    } else {
      PackageManifest::default()
    };
    let manifest = match &over {
      Some(over) => over.apply(&manifest),
      None => manifest,
    };

    let version = manifest.version.clone().unwrap_or_else(|| "0.0.0".to_string());
    let id = package_id(name, &version, &located.source);
    debug!(package = %name, id = %id, source = %located.source, "resolved");

    self.by_name.insert(name.to_string(), id.clone());
    self.installation.0.insert(
      id.clone(),
      InstallEntry {
        kind: located.kind,
        path: located.path.clone(),
        source: located.source.clone(),
      },
    );

    let dependencies = self.resolve_all(&manifest.dependencies, &located.path)?;
    let build_dependencies = self.resolve_all(&manifest.build_dependencies, &located.path)?;
    let mut dependencies = dependencies;
    dependencies.extend(self.resolve_optional(&manifest.opt_dependencies, &located.path)?);

    self.nodes.insert(
      id.clone(),
      LockNode {
        name: name.to_string(),
        version,
        source: located.source,
        override_: over,
        dependencies,
        build_dependencies,
        dev_dependencies: Vec::new(),
      },
    );
    Ok(id)
  }

  fn locate(&self, name: &str, spec: &str, base: &Path) -> Result<Located, Error> {
    let unresolved = |reason: &str| ManifestError::Unresolved {
      name: name.to_string(),
      spec: spec.to_string(),
      reason: reason.to_string(),
    };

    if spec.starts_with("no-source:") {
      let path = self.ctx.sandbox_dir().join("no-source").join(name.replace('/', "__"));
      std::fs::create_dir_all(&path)?;
      return Ok(Located {
        kind: InstallKind::Install,
        path,
        source: "no-source:".to_string(),
        has_manifest: false,
      });
    }

    let local = if let Some(rest) = spec.strip_prefix("link:") {
      Some((InstallKind::Link, rest))
    } else if let Some(rest) = spec.strip_prefix("path:") {
      Some((InstallKind::Install, rest))
    } else if spec.starts_with("./") || spec.starts_with("../") || spec.starts_with('/') {
      Some((InstallKind::Install, spec))
    } else {
      None
    };

    if let Some((kind, rel)) = local {
      let path = base.join(rel);
      let path = dunce::canonicalize(&path).map_err(|_| unresolved(&format!("{} does not exist", path.display())))?;
      let prefix = match kind {
        InstallKind::Link => "link",
        InstallKind::Install => "path",
      };
      let has_manifest = manifest::find_manifest(&path).is_some();
      return Ok(Located {
        kind,
        source: format!("{prefix}:{}", display_relative(&path, &self.ctx.project_root)),
        path,
        has_manifest,
      });
    }

    let vendored = self.ctx.project_root.join("node_modules").join(name);
    if manifest::find_manifest(&vendored).is_some() {
      let path = dunce::canonicalize(&vendored).unwrap_or(vendored);
      return Ok(Located {
        kind: InstallKind::Install,
        source: format!("path:node_modules/{name}"),
        path,
        has_manifest: true,
      });
    }

    Err(unresolved("only link:, path: and no-source: sources can be resolved without a registry").into())
  }
}

fn parse_resolution(name: &str, value: &serde_json::Value) -> Result<(String, Option<Override>), Error> {
  match value {
    serde_json::Value::String(spec) => Ok((spec.clone(), None)),
    serde_json::Value::Object(object) => {
      let source = object
        .get("source")
        .and_then(|s| s.as_str())
        .ok_or_else(|| ManifestError::InvalidResolution {
          name: name.to_string(),
          message: "expected a 'source' string".to_string(),
        })?;
      let over = match object.get("override") {
        Some(value) => Some(Override::parse(value).frame(|| format!("applying override for {name}"))?),
        None => None,
      };
      Ok((source.to_string(), over))
    }
    _ => Err(
      ManifestError::InvalidResolution {
        name: name.to_string(),
        message: "expected a string or {source, override}".to_string(),
      }
      .into(),
    ),
  }
}

fn display_relative(path: &Path, root: &Path) -> String {
  match path.strip_prefix(root) {
    Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
    Ok(rel) => format!("./{}", rel.to_string_lossy().replace('\\', "/")),
    Err(_) => path.to_string_lossy().to_string(),
  }
}
