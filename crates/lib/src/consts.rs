/// Name used for per-user directories and the CLI binary.
pub const APP_NAME: &str = "esy";

/// Version segment of the global store path (`<prefix>/3`).
pub const STORE_VERSION: &str = "3";

/// Store tree holding build directories.
pub const BUILD_TREE: &str = "b";

/// Store tree holding in-progress installs.
pub const STAGE_TREE: &str = "s";

/// Store tree holding committed installs.
pub const INSTALL_TREE: &str = "i";

/// Length of the hash suffix in task ids.
pub const ID_HASH_LEN: usize = 8;

/// Metadata directory inside build and install dirs.
pub const META_DIR: &str = "_esy";

/// Source fingerprint recorded by the last successful build.
pub const CHECKSUM_FILE: &str = "checksum";

/// Store root recorded at commit time, used to relocate imports.
pub const STORE_PREFIX_FILE: &str = "storePrefix";

/// Name of the sandbox defined by `package.json` / `esy.json`.
pub const DEFAULT_SANDBOX: &str = "default";

/// Manifest files tried, in order, for the default sandbox.
pub const DEFAULT_MANIFESTS: &[&str] = &["esy.json", "package.json"];

/// Marker that stops the upward search for a sandbox manifest.
pub const PROJECT_MARKER: &str = ".esyproject";

pub const LOCK_DIR: &str = "esy.lock";
pub const LOCK_INDEX: &str = "index.json";
pub const INSTALLATION_FILE: &str = "installation.json";

/// Dev symlinks created in the project root after building the root task.
pub const BUILD_LINK: &str = "_esybuild";
pub const INSTALL_LINK: &str = "_esyinstall";

/// Directory names never considered part of a package's source.
pub const SOURCE_IGNORE: &[&str] = &["_esy", "_export", "node_modules", "_esybuild", "_esyinstall", ".git"];

/// PATH tail appended to every build environment.
pub const SYSTEM_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Number of log lines attached to a build failure.
pub const LOG_TAIL_LINES: usize = 30;

/// Layout created inside every install directory before the build runs.
pub const INSTALL_LAYOUT: &[&str] = &[
  "bin",
  "sbin",
  "lib",
  "lib/stublibs",
  "lib/toplevel",
  "man",
  "doc",
  "share",
  "etc",
];

pub const ENV_PREFIX_PATH: &str = "ESY__PREFIX";
pub const ENV_BUILD_CONCURRENCY: &str = "ESY__BUILD_CONCURRENCY";
pub const RC_FILE: &str = ".esyrc";

/// Directory, relative to the project root, that `esy export-*` writes to.
pub const EXPORT_DIR: &str = "_export";
