mod cmd;
mod output;

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::Session;

/// esy - build planning and execution for package sandboxes
///
/// Prefix any command with `@<name>` to use the `<name>.json` sandbox.
#[derive(Parser)]
#[command(name = "esy")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve dependencies and write the lock file
  Install,

  /// Build the root package and its dependencies
  Build {
    /// Build the root package like any dependency (no buildDev, no devDependencies)
    #[arg(long)]
    release: bool,

    /// Rebuild root and linked packages without checking their sources
    #[arg(long)]
    skip_staleness_check: bool,

    /// Rebuild root and linked packages even if unchanged
    #[arg(long)]
    force: bool,
  },

  /// Build the dependencies of the root package
  BuildDependencies {
    /// Build every package in the sandbox except the root
    #[arg(long)]
    all: bool,

    /// Also build devDependencies
    #[arg(long = "devDependencies")]
    dev_dependencies: bool,

    #[arg(long)]
    release: bool,
  },

  /// Print the build environment of a package
  BuildEnv {
    #[arg(long)]
    json: bool,

    #[arg(long)]
    release: bool,

    /// Package name or name@version (default: root)
    #[arg(short, long = "package")]
    p: Option<String>,
  },

  /// Print the command environment of a package
  CommandEnv {
    #[arg(long)]
    json: bool,

    /// Package name or name@version (default: root)
    #[arg(short, long = "package")]
    p: Option<String>,
  },

  /// Print the exec environment of a package
  ExecEnv {
    #[arg(long)]
    json: bool,

    /// Package name or name@version (default: root)
    #[arg(short, long = "package")]
    p: Option<String>,
  },

  /// Print the rendered build plan of a package
  BuildPlan {
    /// Package name or name@version (default: root)
    #[arg(short, long = "package")]
    p: Option<String>,
  },

  /// Build the root, then run a command in its exec environment
  X {
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
  },

  /// Build dependencies, then run a command in the root build environment
  B {
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
  },

  /// Export a built package from the store
  ExportBuild {
    /// Install directory of the build (`<store>/i/<id>`)
    path: PathBuf,
  },

  /// Import exported builds into the store
  ImportBuild {
    /// Archive or directory produced by export-build
    path: Option<PathBuf>,

    /// File listing one export path per line
    #[arg(long)]
    from: Option<PathBuf>,
  },

  /// Export every built dependency of the root
  ExportDependencies {
    #[arg(long)]
    release: bool,
  },

  /// Show the state of the sandbox
  Status {
    #[arg(long)]
    json: bool,
  },

  /// Build dependencies, then run a command in the root command environment
  #[command(external_subcommand)]
  External(Vec<String>),
}

fn main() -> ExitCode {
  let (sandbox, args) = split_sandbox(std::env::args_os().collect());
  let cli = Cli::parse_from(args);
  init_tracing(cli.verbose);

  match run(cli, sandbox) {
    Ok(code) => code,
    Err(err) => {
      output::print_failure(&err);
      ExitCode::FAILURE
    }
  }
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_env("ESY_LOG").unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_ansi(std::io::stderr().is_terminal())
    .with_target(false)
    .without_time()
    .init();
}

/// Strip a leading `@<name>` sandbox selector from the arguments.
fn split_sandbox(mut args: Vec<OsString>) -> (Option<String>, Vec<OsString>) {
  let sandbox = args
    .get(1)
    .and_then(|arg| arg.to_str())
    .filter(|arg| arg.len() > 1 && arg.starts_with('@'))
    .map(str::to_string);
  if sandbox.is_some() {
    args.remove(1);
  }
  (sandbox, args)
}

fn run(cli: Cli, sandbox: Option<String>) -> Result<ExitCode> {
  let cwd = std::env::current_dir().context("Failed to read the current directory")?;
  let session = Session {
    cwd: dunce::canonicalize(&cwd).unwrap_or(cwd),
    sandbox,
  };

  let Some(command) = cli.command else {
    cmd::cmd_install(&session)?;
    cmd::cmd_build(&session, false, false, false)?;
    return Ok(ExitCode::SUCCESS);
  };

  match command {
    Commands::Install => cmd::cmd_install(&session)?,
    Commands::Build {
      release,
      skip_staleness_check,
      force,
    } => cmd::cmd_build(&session, release, skip_staleness_check, force)?,
    Commands::BuildDependencies {
      all,
      dev_dependencies,
      release,
    } => cmd::cmd_build_dependencies(&session, all, dev_dependencies, release)?,
    Commands::BuildEnv { json, release, p } => cmd::cmd_env(&session, cmd::EnvKind::Build, json, release, p.as_deref())?,
    Commands::CommandEnv { json, p } => cmd::cmd_env(&session, cmd::EnvKind::Command, json, false, p.as_deref())?,
    Commands::ExecEnv { json, p } => cmd::cmd_env(&session, cmd::EnvKind::Exec, json, false, p.as_deref())?,
    Commands::BuildPlan { p } => cmd::cmd_build_plan(&session, p.as_deref())?,
    Commands::X { command } => return cmd::cmd_x(&session, &command),
    Commands::B { command } => return cmd::cmd_b(&session, &command),
    Commands::ExportBuild { path } => cmd::cmd_export_build(&session, &path)?,
    Commands::ImportBuild { path, from } => cmd::cmd_import_build(&session, path.as_deref(), from.as_deref())?,
    Commands::ExportDependencies { release } => cmd::cmd_export_dependencies(&session, release)?,
    Commands::Status { json } => cmd::cmd_status(&session, json)?,
    Commands::External(command) => return cmd::cmd_command(&session, &command),
  }
  Ok(ExitCode::SUCCESS)
}
