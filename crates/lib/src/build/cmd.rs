//! Running a single build or install command.
//!
//! Commands run with a cleared environment: only the composed build
//! environment plus a fixed set of isolation variables is visible.
//! - `HOME` points at a directory that does not exist
//! - `TMPDIR`/`TMP`/`TEMP`/`TEMPDIR` point into the task's build dir
//! - `LANG`/`LC_ALL` are `C`, `SOURCE_DATE_EPOCH` is fixed
//!
//! Stdout and stderr are appended to the task log, each command preceded by a
//! `# esy-build-command:` header line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command as Process;
use tracing::debug;

use super::BuildError;
use crate::consts::LOG_TAIL_LINES;
use crate::manifest::Command;

/// Where and how a task's commands run.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
  pub task: &'a str,
  pub env: &'a [(String, String)],
  pub cwd: &'a Path,
  pub tmp_dir: &'a Path,
  pub log_path: &'a Path,
  pub shell: Option<&'a str>,
}

/// Run `command` to completion, failing on a nonzero exit.
pub async fn run_command(command: &Command, ctx: &CommandContext<'_>) -> Result<(), BuildError> {
  let shown = command.to_string();
  let spawn_err = |source: std::io::Error| BuildError::Spawn {
    command: shown.clone(),
    source,
  };

  tokio::fs::create_dir_all(ctx.tmp_dir).await.map_err(spawn_err)?;
  let log = open_log(ctx.log_path, &shown).map_err(spawn_err)?;
  let stderr = log.try_clone().map_err(spawn_err)?;

  let mut process = match command {
    Command::Shell(script) => {
      let (shell, args) = get_shell(ctx.shell);
      let mut p = Process::new(shell);
      p.args(args).arg(script);
      p
    }
    Command::Args(args) => {
      let Some((program, rest)) = args.split_first() else {
        return Ok(());
      };
      let mut p = Process::new(program);
      p.args(rest);
      p
    }
  };

  process
    .current_dir(ctx.cwd)
    .env_clear()
    .env("HOME", "/homeless-shelter")
    .env("TMPDIR", ctx.tmp_dir)
    .env("TMP", ctx.tmp_dir)
    .env("TEMP", ctx.tmp_dir)
    .env("TEMPDIR", ctx.tmp_dir)
    .env("LANG", "C")
    .env("LC_ALL", "C")
    // 1980-01-01T00:00:00Z
    .env("SOURCE_DATE_EPOCH", "315532800")
    .envs(ctx.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    .stdin(Stdio::null())
    .stdout(Stdio::from(log))
    .stderr(Stdio::from(stderr));

  debug!(task = %ctx.task, command = %shown, cwd = ?ctx.cwd, "spawning process");
  let status = process.status().await.map_err(spawn_err)?;

  if status.success() {
    return Ok(());
  }

  Err(BuildError::CommandFailed {
    task: ctx.task.to_string(),
    command: shown,
    exit_code: status.code(),
    log_path: ctx.log_path.to_path_buf(),
    log_tail: log_tail(ctx.log_path, LOG_TAIL_LINES),
  })
}

fn open_log(path: &Path, command: &str) -> std::io::Result<File> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let mut file = OpenOptions::new().create(true).append(true).open(path)?;
  writeln!(file, "# esy-build-command: {command}")?;
  Ok(file)
}

/// The last `lines` lines of a log file. Missing files yield nothing.
pub fn log_tail(path: &Path, lines: usize) -> Vec<String> {
  let Ok(file) = File::open(path) else {
    return Vec::new();
  };
  let all: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
  let skip = all.len().saturating_sub(lines);
  all.into_iter().skip(skip).collect()
}

/// Shell and leading arguments for string commands.
///
/// Interactive shells may source profiles that change the environment, so
/// the default is always `/bin/sh` rather than `$SHELL`.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    ("cmd.exe".to_string(), vec!["/C".to_string()])
  }
}
