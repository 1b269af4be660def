//! Export and import of store entries.
//!
//! An export is a gzipped tar of `i/<id>` with every entry below `<id>/`.
//! Archives are deterministic: entries are sorted, and timestamps and owners
//! are zeroed. Symlinks are stored as links, never followed.
//!
//! Importing unpacks into the stage tree of the target store, rewrites
//! absolute symlinks from the exporting store root (recorded in
//! `_esy/storePrefix`) to the target store root, then renames the entry into
//! `i/<id>`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{Store, StoreError, io_err, promote, read_meta};
use crate::consts::{META_DIR, STORE_PREFIX_FILE};
use crate::plan::TaskId;
use crate::util::fs::{copy_tree, relocate_symlinks};

const ARCHIVE_EXT: &str = ".tar.gz";

/// Write `<out_dir>/<id>.tar.gz` from the store entry `id`.
pub fn export(store: &Store, id: &TaskId, out_dir: &Path) -> Result<PathBuf, StoreError> {
  let install_dir = store.install_dir(id);
  if !install_dir.is_dir() {
    return Err(StoreError::MissingEntry(id.to_string()));
  }
  fs::create_dir_all(out_dir).map_err(io_err(out_dir))?;
  let out = out_dir.join(format!("{id}{ARCHIVE_EXT}"));
  let archive_err = |source: io::Error| StoreError::Archive {
    path: out.clone(),
    source,
  };

  let tmp = NamedTempFile::new_in(out_dir).map_err(archive_err)?;
  let encoder = GzEncoder::new(tmp.reopen().map_err(archive_err)?, Compression::default());
  let mut builder = tar::Builder::new(encoder);
  builder.follow_symlinks(false);

  for entry in WalkDir::new(&install_dir).follow_links(false).sort_by_file_name() {
    let entry = entry.map_err(|e| archive_err(io::Error::other(e)))?;
    let rel = entry
      .path()
      .strip_prefix(&install_dir)
      .map_err(|e| archive_err(io::Error::other(e)))?;
    let name = Path::new(id.as_str()).join(rel);
    append_entry(&mut builder, entry.path(), &name, entry.file_type()).map_err(archive_err)?;
  }

  builder
    .into_inner()
    .and_then(|encoder| encoder.finish())
    .map_err(archive_err)?;
  tmp.persist(&out).map_err(|e| archive_err(e.error))?;

  info!(id = %id, archive = ?out, "exported build");
  Ok(out)
}

fn append_entry<W: io::Write>(
  builder: &mut tar::Builder<W>,
  path: &Path,
  name: &Path,
  file_type: fs::FileType,
) -> io::Result<()> {
  let meta = fs::symlink_metadata(path)?;
  let mut header = tar::Header::new_gnu();
  header.set_mtime(0);
  header.set_uid(0);
  header.set_gid(0);
  header.set_mode(mode(&meta));

  if file_type.is_symlink() {
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    builder.append_link(&mut header, name, fs::read_link(path)?)
  } else if file_type.is_dir() {
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_cksum();
    builder.append_data(&mut header, name, io::empty())
  } else {
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(meta.len());
    header.set_cksum();
    builder.append_data(&mut header, name, File::open(path)?)
  }
}

#[cfg(unix)]
fn mode(meta: &fs::Metadata) -> u32 {
  use std::os::unix::fs::PermissionsExt;
  meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode(meta: &fs::Metadata) -> u32 {
  if meta.is_dir() { 0o755 } else { 0o644 }
}

/// Task id named by an export path: `<dir>/<id>` or `<dir>/<id>.tar.gz`.
pub fn id_of_export(path: &Path) -> Option<TaskId> {
  let name = path.file_name()?.to_str()?;
  let id = name.strip_suffix(ARCHIVE_EXT).unwrap_or(name);
  (!id.is_empty()).then(|| TaskId(id.to_string()))
}

/// Find an export of `id` in `dir`, as an archive or an unpacked directory.
pub fn find_export(dir: &Path, id: &TaskId) -> Option<PathBuf> {
  [dir.join(format!("{id}{ARCHIVE_EXT}")), dir.join(id.as_str())]
    .into_iter()
    .find(|p| p.exists())
}

/// Import an exported entry into `store`, returning its id.
///
/// `path` is a `.tar.gz` produced by [`export`] or an unpacked install
/// directory named after the id.
pub fn import(store: &Store, path: &Path) -> Result<TaskId, StoreError> {
  let id = id_of_export(path).ok_or_else(|| StoreError::Corrupt {
    path: path.to_path_buf(),
    message: "cannot determine the build id from the file name".to_string(),
  })?;

  let stage_root = store.root().join(crate::consts::STAGE_TREE);
  fs::create_dir_all(&stage_root).map_err(io_err(&stage_root))?;
  let scratch = tempfile::Builder::new()
    .prefix(".import-")
    .tempdir_in(&stage_root)
    .map_err(io_err(&stage_root))?;
  let unpacked = scratch.path().join(id.as_str());

  if path.is_dir() {
    copy_tree(path, &unpacked, &[]).map_err(io_err(path))?;
  } else {
    let archive_err = |source: io::Error| StoreError::Archive {
      path: path.to_path_buf(),
      source,
    };
    let file = File::open(path).map_err(archive_err)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(false);
    archive.unpack(scratch.path()).map_err(archive_err)?;
  }

  if !unpacked.is_dir() {
    return Err(StoreError::Corrupt {
      path: path.to_path_buf(),
      message: format!("export does not contain {id}/"),
    });
  }

  let target_root = store.root();
  if let Some(prefix) = read_meta(&unpacked, STORE_PREFIX_FILE) {
    let from = PathBuf::from(prefix);
    if from != target_root {
      let relocated = relocate_symlinks(&unpacked, &from, target_root).map_err(io_err(&unpacked))?;
      debug!(id = %id, from = ?from, to = ?target_root, links = relocated, "relocated imported symlinks");
    }
  }
  let prefix_file = unpacked.join(META_DIR).join(STORE_PREFIX_FILE);
  if let Some(parent) = prefix_file.parent() {
    fs::create_dir_all(parent).map_err(io_err(parent))?;
  }
  fs::write(&prefix_file, target_root.to_string_lossy().as_bytes()).map_err(io_err(&prefix_file))?;

  promote(&unpacked, &store.install_dir(&id))?;
  info!(id = %id, source = ?path, "imported build");
  Ok(id)
}
