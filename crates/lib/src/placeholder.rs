//! Placeholder parsing and substitution for build commands and environments.
//!
//! Two placeholder syntaxes are recognized:
//!
//! - `#{...}`: esy expressions. The body is a sequence of atoms concatenated
//!   together: `scope.field` references (`self.bin`, `dep.lib`,
//!   `@scope/pkg.share`), bare names (`os`), quoted literals (`'lib'`), path
//!   and list separators (`/`, `:`), and `$VAR` shell references which pass
//!   through untouched.
//! - `%{scope:field}%` / `%{field}%`: opam variables.
//!
//! Text outside placeholders, including `$HOME`-style shell variables, is
//! copied verbatim. A `#` or `%` not followed by `{` is an ordinary character.
//!
//! Resolution is lazy: parsing only checks syntax, and a reference nothing can
//! resolve fails when the string is expanded.
//!
//! # Example
//!
//! ```
//! use esy_lib::placeholder::{parse, Atom, Segment};
//!
//! let segments = parse("#{self.bin / 'tool'}:$PATH").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Esy(vec![
//!         Atom::Var { namespace: Some("self".into()), field: "bin".into() },
//!         Atom::PathSep,
//!         Atom::Literal("tool".into()),
//!     ]),
//!     Segment::Literal(":$PATH".to_string()),
//! ]);
//! ```

use thiserror::Error;

/// One element of an esy expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
  /// `namespace.field`, or a bare `field`.
  Var { namespace: Option<String>, field: String },
  /// `'text'`
  Literal(String),
  /// `/`
  PathSep,
  /// `:`
  ListSep,
  /// `$NAME`, kept as shell syntax.
  EnvVar(String),
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// `#{...}`
  Esy(Vec<Atom>),

  /// `%{namespace:field}%`
  Opam { namespace: Option<String>, field: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("unable to resolve {expr}")]
  Unresolved { expr: String },
}

/// A named-field lookup that placeholders resolve against.
///
/// `namespace` is the part before `.` (esy) or `:` (opam), if any.
pub trait Scope {
  fn lookup(&self, namespace: Option<&str>, field: &str) -> Option<String>;
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed or its body is malformed.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;
  let mut offset = 0;

  while let Some(pos) = rest.find(['#', '%']) {
    let sigil = &rest[pos..];
    let opening = sigil.starts_with("#{") || sigil.starts_with("%{");
    if !opening {
      literal.push_str(&rest[..pos + 1]);
      rest = &rest[pos + 1..];
      offset += pos + 1;
      continue;
    }

    literal.push_str(&rest[..pos]);
    let start = offset + pos;
    let esy = sigil.starts_with('#');
    let body_start = pos + 2;
    let close = if esy { "}" } else { "}%" };
    let Some(len) = rest[body_start..].find(close) else {
      return Err(PlaceholderError::Unclosed(start));
    };
    let body = &rest[body_start..body_start + len];

    if !literal.is_empty() {
      segments.push(Segment::Literal(std::mem::take(&mut literal)));
    }
    segments.push(if esy { parse_esy(body)? } else { parse_opam(body)? });

    let consumed = body_start + len + close.len();
    rest = &rest[consumed..];
    offset += consumed;
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }
  Ok(segments)
}

fn parse_esy(body: &str) -> Result<Segment, PlaceholderError> {
  let mut atoms = Vec::new();
  let mut chars = body.char_indices().peekable();

  while let Some(&(i, c)) = chars.peek() {
    match c {
      c if c.is_whitespace() => {
        chars.next();
      }
      '/' => {
        chars.next();
        atoms.push(Atom::PathSep);
      }
      ':' => {
        chars.next();
        atoms.push(Atom::ListSep);
      }
      '\'' => {
        chars.next();
        let text = &body[i + 1..];
        let Some(end) = text.find('\'') else {
          return Err(PlaceholderError::Malformed(format!("unterminated literal in '#{{{body}}}'")));
        };
        atoms.push(Atom::Literal(text[..end].to_string()));
        for _ in 0..text[..end].chars().count() + 1 {
          chars.next();
        }
      }
      '$' => {
        chars.next();
        let name: String = std::iter::from_fn(|| chars.next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_'))
          .map(|(_, c)| c)
          .collect();
        if name.is_empty() {
          return Err(PlaceholderError::Malformed(format!("empty variable in '#{{{body}}}'")));
        }
        atoms.push(Atom::EnvVar(name));
      }
      _ => {
        let mut ident = String::new();
        while let Some((_, c)) = chars.next_if(|(_, c)| !c.is_whitespace() && !matches!(*c, '/' | ':' | '\'')) {
          ident.push(c);
        }
        // `@scope/name.field`
        if ident.starts_with('@') && !ident.contains('/') && chars.next_if(|(_, c)| *c == '/').is_some() {
          ident.push('/');
          while let Some((_, c)) = chars.next_if(|(_, c)| !c.is_whitespace() && !matches!(*c, '/' | ':' | '\'')) {
            ident.push(c);
          }
        }
        atoms.push(parse_var(&ident, body)?);
      }
    }
  }

  if atoms.is_empty() {
    return Err(PlaceholderError::Malformed("empty #{} placeholder".to_string()));
  }
  Ok(Segment::Esy(atoms))
}

fn parse_var(ident: &str, body: &str) -> Result<Atom, PlaceholderError> {
  match ident.rsplit_once('.') {
    Some((namespace, field)) if !namespace.is_empty() && !field.is_empty() => Ok(Atom::Var {
      namespace: Some(namespace.to_string()),
      field: field.to_string(),
    }),
    Some(_) => Err(PlaceholderError::Malformed(format!("invalid reference '{ident}' in '#{{{body}}}'"))),
    None => Ok(Atom::Var {
      namespace: None,
      field: ident.to_string(),
    }),
  }
}

fn parse_opam(body: &str) -> Result<Segment, PlaceholderError> {
  let body = body.trim();
  let (namespace, field) = match body.split_once(':') {
    Some((ns, field)) => (Some(ns.trim().to_string()), field.trim()),
    None => (None, body),
  };
  if field.is_empty() || namespace.as_deref() == Some("") {
    return Err(PlaceholderError::Malformed(format!("invalid opam variable '%{{{body}}}%'")));
  }
  Ok(Segment::Opam {
    namespace,
    field: field.to_string(),
  })
}

/// Expand every placeholder in `input`: `#{}` against `esy`, `%{}%` against
/// `opam`.
///
/// # Errors
///
/// Returns an error if parsing fails or if any reference cannot be resolved.
pub fn substitute(input: &str, esy: &dyn Scope, opam: &dyn Scope) -> Result<String, PlaceholderError> {
  if !input.contains("#{") && !input.contains("%{") {
    return Ok(input.to_string());
  }
  let segments = parse(input)?;
  substitute_segments(&segments, esy, opam)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], esy: &dyn Scope, opam: &dyn Scope) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Esy(atoms) => {
        for atom in atoms {
          match atom {
            Atom::Var { namespace, field } => {
              let value = esy
                .lookup(namespace.as_deref(), field)
                .ok_or_else(|| PlaceholderError::Unresolved {
                  expr: match namespace {
                    Some(ns) => format!("#{{{ns}.{field}}}"),
                    None => format!("#{{{field}}}"),
                  },
                })?;
              result.push_str(&value);
            }
            Atom::Literal(s) => result.push_str(s),
            Atom::PathSep => result.push('/'),
            Atom::ListSep => result.push(':'),
            Atom::EnvVar(name) => {
              result.push('$');
              result.push_str(name);
            }
          }
        }
      }
      Segment::Opam { namespace, field } => {
        let value = opam
          .lookup(namespace.as_deref(), field)
          .ok_or_else(|| PlaceholderError::Unresolved {
            expr: match namespace {
              Some(ns) => format!("%{{{ns}:{field}}}%"),
              None => format!("%{{{field}}}%"),
            },
          })?;
        result.push_str(&value);
      }
    }
  }

  Ok(result)
}
