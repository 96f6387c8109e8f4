//! Filesystem primitives used by the downloader and the installer.
//!
//! Every mutating call goes through [`FileOps`] so tests can inject faults at
//! a precise point (for example "the third copy into the install directory
//! fails") without relying on permissions, which root ignores.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Highest `.bakNNN` suffix tried when a retained name is taken.
const MAX_BACKUP_SUFFIX: u32 = 999;

pub trait FileOps: Send + Sync {
    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()> {
        fs::copy(src, dst).map(|_| ())
    }

    fn rename(&self, src: &Path, dst: &Path) -> io::Result<()> {
        fs::rename(src, dst)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}

/// Plain `std::fs` implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileOps;

impl FileOps for StdFileOps {}

/// Moves a file or directory, falling back to copy-and-delete across volumes.
pub fn move_path(ops: &dyn FileOps, src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        ops.create_dir_all(parent)?;
    }
    if ops.rename(src, dst).is_ok() {
        return Ok(());
    }
    if src.is_dir() {
        copy_tree(ops, src, dst, &[])?;
        ops.remove_dir_all(src)
    } else {
        ops.copy_file(src, dst)?;
        ops.remove_file(src)
    }
}

/// Moves `source` into `retention_dir`, never overwriting an earlier entry:
/// a taken name gets a `.bak001` ... `.bak999` suffix.
pub fn retain(ops: &dyn FileOps, retention_dir: &Path, source: &Path) -> io::Result<PathBuf> {
    ops.create_dir_all(retention_dir)?;
    let file_name = source
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("no file name: {}", source.display())))?;

    let mut dest = retention_dir.join(file_name);
    if dest.exists() {
        let base = file_name.to_string_lossy();
        for i in 1..=MAX_BACKUP_SUFFIX {
            dest = retention_dir.join(format!("{}.bak{:03}", base, i));
            if !dest.exists() {
                break;
            }
        }
    }

    move_path(ops, source, &dest)?;
    info!(from = %source.display(), to = %dest.display(), "retained");
    Ok(dest)
}

/// Relative paths of every regular file under `root`, sorted.
pub fn walk_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(rel) = pending.pop() {
        for entry in fs::read_dir(root.join(&rel))? {
            let entry = entry?;
            let child = rel.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                pending.push(child);
            } else {
                files.push(child);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Recursive copy of `src` into `dst`, overwriting files in place.
/// Top-level entries named in `skip` are left out.
pub fn copy_tree(ops: &dyn FileOps, src: &Path, dst: &Path, skip: &[&str]) -> io::Result<()> {
    ops.create_dir_all(dst)?;
    for rel in walk_files(src)? {
        if is_skipped(&rel, skip) {
            continue;
        }
        let target = dst.join(&rel);
        if let Some(parent) = target.parent() {
            ops.create_dir_all(parent)?;
        }
        ops.copy_file(&src.join(&rel), &target)?;
    }
    Ok(())
}

pub(crate) fn is_skipped(rel: &Path, skip: &[&str]) -> bool {
    rel.components().count() == 1 && skip.iter().any(|name| rel.as_os_str() == *name)
}

/// Removal that logs instead of failing; used by compensating cleanup.
pub fn remove_quietly(ops: &dyn FileOps, path: &Path) {
    let result = if path.is_dir() {
        ops.remove_dir_all(path)
    } else if path.exists() {
        ops.remove_file(path)
    } else {
        Ok(())
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "cleanup failed");
    }
}
