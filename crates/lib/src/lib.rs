//! esy-lib: build planning and execution for esy sandboxes.
//!
//! The crate turns a resolved package graph into content-addressed build tasks
//! and realizes them in a local or global store:
//! - `sandbox`: sandbox discovery, overrides, lock file and local installer
//! - `plan`: the task graph with content-derived ids
//! - `env`: build, command and exec environments
//! - `placeholder` / `scope`: `#{...}` and `%{...}%` expansion
//! - `store`: store layout, staleness, commit and archives
//! - `build`: the concurrent build executor

pub mod build;
pub mod config;
pub mod consts;
pub mod env;
pub mod error;
pub mod manifest;
pub mod placeholder;
pub mod plan;
pub mod platform;
pub mod project;
pub mod sandbox;
pub mod scope;
pub mod store;
pub mod util;

pub use error::{Error, ResultExt};
pub use project::Project;
