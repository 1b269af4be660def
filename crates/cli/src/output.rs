//! CLI output formatting utilities.
//!
//! Colored status messages, durations, and the error report printed when a
//! command fails.

use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use esy_lib::build::BuildError;

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Print a failed command's error: context frames outermost first, then the
/// deepest cause. Build failures also show the command and the log tail.
pub fn print_failure(err: &anyhow::Error) {
  for line in failure_lines(err) {
    match line {
      Line::Headline(text) => print_error(&text),
      Line::Frame(text) => eprintln!(
        "  {} {}",
        symbols::ARROW.if_supports_color(Stream::Stderr, |s| s.dimmed()),
        text
      ),
      Line::Detail(text) => eprintln!("    {}", text),
      Line::Log(text) => eprintln!("    {}", text.if_supports_color(Stream::Stderr, |s| s.dimmed())),
    }
  }
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
  Headline(String),
  Frame(String),
  Detail(String),
  Log(String),
}

fn failure_lines(err: &anyhow::Error) -> Vec<Line> {
  let Some(lib_err) = err.downcast_ref::<esy_lib::Error>() else {
    return vec![Line::Headline(format!("{err:#}"))];
  };

  let frames = lib_err.frames();
  let cause = lib_err.root_cause();
  let mut lines = Vec::new();

  match frames.first() {
    Some(first) => {
      lines.push(Line::Headline(format!("error while {first}")));
      lines.extend(frames[1..].iter().map(|f| Line::Frame(f.to_string())));
    }
    None => lines.push(Line::Headline("error".to_string())),
  }

  let mut message = cause.to_string();
  let mut source = std::error::Error::source(cause);
  while let Some(inner) = source {
    let text = inner.to_string();
    if !message.contains(&text) {
      message.push_str(": ");
      message.push_str(&text);
    }
    source = inner.source();
  }
  lines.push(Line::Frame(message));

  if let Some(BuildError::CommandFailed {
    command,
    exit_code,
    log_path,
    log_tail,
    ..
  }) = lib_err.as_build_error()
  {
    lines.push(Line::Detail(format!("command: {command}")));
    lines.push(Line::Detail(format!(
      "exit code: {}",
      exit_code.map_or_else(|| "none".to_string(), |c| c.to_string())
    )));
    lines.push(Line::Detail(format!("log: {}", log_path.display())));
    lines.extend(log_tail.iter().map(|l| Line::Log(l.clone())));
  }
  lines
}
