//! Filesystem helpers: atomic writes, tree copies and symlink relocation.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

/// Write `data` to `path` through a temp file in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
  let dir = path.parent().unwrap_or_else(|| Path::new("."));
  fs::create_dir_all(dir)?;
  let mut tmp = NamedTempFile::new_in(dir)?;
  tmp.write_all(data)?;
  tmp.as_file().sync_all()?;
  tmp.persist(path).map_err(|e| e.error)?;
  Ok(())
}

/// Remove a file, symlink or directory tree if it exists.
pub fn remove_path(path: &Path) -> io::Result<()> {
  match fs::symlink_metadata(path) {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}

/// Create a symlink at `link` pointing to `target`.
#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  if target.is_dir() {
    std::os::windows::fs::symlink_dir(target, link)
  } else {
    std::os::windows::fs::symlink_file(target, link)
  }
}

/// Replace whatever is at `link` with a symlink to `target`.
pub fn replace_symlink(target: &Path, link: &Path) -> io::Result<()> {
  remove_path(link)?;
  symlink(target, link)
}

/// Copy a directory tree, preserving symlinks and permissions.
///
/// Top-level and nested entries whose file name is in `exclude` are skipped.
pub fn copy_tree(src: &Path, dst: &Path, exclude: &[&str]) -> io::Result<()> {
  fs::create_dir_all(dst)?;
  let walker = WalkDir::new(src).sort_by_file_name().into_iter().filter_entry(|e| {
    e.depth() == 0 || e.file_name().to_str().map(|n| !exclude.contains(&n)).unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    if rel.as_os_str().is_empty() {
      continue;
    }
    let target = dst.join(rel);
    let file_type = entry.file_type();
    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      symlink(&fs::read_link(entry.path())?, &target)?;
    } else if file_type.is_file() {
      fs::copy(entry.path(), &target)?;
    }
  }
  Ok(())
}

/// Rewrite absolute symlinks under `dir` that point below `from` so they point
/// at the same relative location below `to`. Returns the number of links rewritten.
pub fn relocate_symlinks(dir: &Path, from: &Path, to: &Path) -> io::Result<usize> {
  let mut rewritten = 0;
  for entry in WalkDir::new(dir).follow_links(false) {
    let entry = entry.map_err(io::Error::other)?;
    if !entry.file_type().is_symlink() {
      continue;
    }
    let target = fs::read_link(entry.path())?;
    if let Some(relocated) = relocate_path(&target, from, to) {
      debug!(link = ?entry.path(), from = ?target, to = ?relocated, "relocating symlink");
      replace_symlink(&relocated, entry.path())?;
      rewritten += 1;
    }
  }
  Ok(rewritten)
}

/// Replace every occurrence of `from` with `to` inside the regular files under
/// `dir`. Symlinks are left alone. Returns the number of files rewritten.
pub fn rewrite_in_files(dir: &Path, from: &str, to: &str) -> io::Result<usize> {
  if from.is_empty() || from == to {
    return Ok(0);
  }
  let mut rewritten = 0;
  for entry in WalkDir::new(dir).follow_links(false) {
    let entry = entry.map_err(io::Error::other)?;
    if !entry.file_type().is_file() {
      continue;
    }
    let content = fs::read(entry.path())?;
    if let Some(replaced) = replace_bytes(&content, from.as_bytes(), to.as_bytes()) {
      debug!(file = ?entry.path(), "rewriting embedded path");
      fs::write(entry.path(), replaced)?;
      rewritten += 1;
    }
  }
  Ok(rewritten)
}

fn replace_bytes(haystack: &[u8], from: &[u8], to: &[u8]) -> Option<Vec<u8>> {
  let mut out: Option<Vec<u8>> = None;
  let mut start = 0;
  let mut i = 0;
  while i + from.len() <= haystack.len() {
    if &haystack[i..i + from.len()] == from {
      let buf = out.get_or_insert_with(|| Vec::with_capacity(haystack.len()));
      buf.extend_from_slice(&haystack[start..i]);
      buf.extend_from_slice(to);
      i += from.len();
      start = i;
    } else {
      i += 1;
    }
  }
  out.map(|mut buf| {
    buf.extend_from_slice(&haystack[start..]);
    buf
  })
}

fn relocate_path(target: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
  if !target.is_absolute() {
    return None;
  }
  target.strip_prefix(from).ok().map(|rest| to.join(rest))
}
