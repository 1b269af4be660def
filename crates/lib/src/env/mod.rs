//! Environment records.
//!
//! An [`Environment`] is an ordered list of variables, each tagged with the
//! origin that set it last. Setting an existing name moves it to the end, so
//! iteration order is the order in which the final values were written.

mod compose;

use std::collections::BTreeMap;

use serde::Serialize;

pub use compose::EnvComposer;

/// Origin of built-in variables.
pub const BUILTIN_ORIGIN: &str = "Built-in";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
  pub name: String,
  pub value: String,
  pub origin: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
  vars: Vec<EnvVar>,
}

impl Environment {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set `name`, replacing any earlier value.
  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>, origin: impl Into<String>) {
    let name = name.into();
    self.vars.retain(|v| v.name != name);
    self.vars.push(EnvVar {
      name,
      value: value.into(),
      origin: origin.into(),
    });
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.vars.iter().find(|v| v.name == name).map(|v| v.value.as_str())
  }

  pub fn origin(&self, name: &str) -> Option<&str> {
    self.vars.iter().find(|v| v.name == name).map(|v| v.origin.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = &EnvVar> {
    self.vars.iter()
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  /// Replace `$NAME` and `${NAME}` with values set so far. Unknown names are
  /// left as written.
  pub fn expand(&self, value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('$') {
      out.push_str(&rest[..pos]);
      let after = &rest[pos + 1..];

      let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
        match braced.find('}') {
          Some(end) => (&braced[..end], end + 2),
          None => ("", 0),
        }
      } else {
        let end = after
          .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
          .unwrap_or(after.len());
        (&after[..end], end)
      };

      match self.get(name).filter(|_| !name.is_empty()) {
        Some(val) => out.push_str(val),
        None => {
          out.push('$');
          out.push_str(&after[..consumed]);
        }
      }
      rest = &after[consumed..];
    }

    out.push_str(rest);
    out
  }

  /// Name/value pairs for spawning processes.
  pub fn to_pairs(&self) -> Vec<(String, String)> {
    self.vars.iter().map(|v| (v.name.clone(), v.value.clone())).collect()
  }

  pub fn to_map(&self) -> BTreeMap<String, String> {
    self.vars.iter().map(|v| (v.name.clone(), v.value.clone())).collect()
  }

  /// Render as a sourceable shell script, grouping runs of variables under
  /// `# <origin>` headers.
  pub fn render_shell(&self) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;
    for var in &self.vars {
      if current != Some(var.origin.as_str()) {
        if current.is_some() {
          out.push('\n');
        }
        out.push_str(&format!("# {}\n", var.origin));
        current = Some(&var.origin);
      }
      out.push_str(&format!("export {}=\"{}\"\n", var.name, shell_escape(&var.value)));
    }
    out
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::Value::Object(
      self
        .vars
        .iter()
        .map(|v| (v.name.clone(), serde_json::Value::String(v.value.clone())))
        .collect(),
    )
  }
}

fn shell_escape(value: &str) -> String {
  let mut escaped = String::with_capacity(value.len());
  for c in value.chars() {
    if matches!(c, '\\' | '"' | '$' | '`') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped
}
