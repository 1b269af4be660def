use std::fmt;

/// Operating system variants, named the way opam names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
  FreeBsd,
  Unknown,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Self {
    match std::env::consts::OS {
      "linux" => Self::Linux,
      "macos" => Self::MacOs,
      "windows" => Self::Windows,
      "freebsd" => Self::FreeBsd,
      _ => Self::Unknown,
    }
  }

  /// Returns the identifier used by the `os` placeholder variable
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "macos",
      Self::Windows => "windows",
      Self::FreeBsd => "freebsd",
      Self::Unknown => "unknown",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Distribution details used by `os-distribution`, `os-family` and `os-version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
  pub distribution: String,
  pub family: String,
  pub version: String,
}

impl OsRelease {
  /// Read `/etc/os-release` on Linux; other systems report the OS name.
  pub fn detect(os: Os) -> Self {
    let fallback = Self {
      distribution: os.as_str().to_string(),
      family: os.as_str().to_string(),
      version: "unknown".to_string(),
    };
    if os != Os::Linux {
      return fallback;
    }
    match std::fs::read_to_string("/etc/os-release") {
      Ok(content) => Self::parse(&content).unwrap_or(fallback),
      Err(_) => fallback,
    }
  }

  fn parse(content: &str) -> Option<Self> {
    let field = |key: &str| {
      content.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        (k.trim() == key).then(|| v.trim().trim_matches('"').to_string())
      })
    };
    let distribution = field("ID")?;
    let family = field("ID_LIKE")
      .and_then(|like| like.split_whitespace().next().map(str::to_string))
      .unwrap_or_else(|| distribution.clone());
    let version = field("VERSION_ID").unwrap_or_else(|| "unknown".to_string());
    Some(Self {
      distribution,
      family,
      version,
    })
  }
}
