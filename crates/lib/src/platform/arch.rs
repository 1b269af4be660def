use std::fmt;

/// CPU architecture variants, named the way opam names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Arm64,
  X86_32,
  Unknown,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Self {
    match std::env::consts::ARCH {
      "x86_64" => Self::X86_64,
      "aarch64" => Self::Arm64,
      "x86" => Self::X86_32,
      _ => Self::Unknown,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Arm64 => "arm64",
      Self::X86_32 => "x86_32",
      Self::Unknown => "unknown",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
