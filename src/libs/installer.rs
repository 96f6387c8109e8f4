//! Update installer.
//!
//! Runs one artifact through `Extracting → Classifying → Applying →
//! CleaningUp`. A failure while applying or cleaning up rolls the install
//! directory back from the journal and installs the new version into a
//! sibling folder `<install>-<version>` instead.
//!
//! Live files are never overwritten directly: each one is first renamed into a
//! per-attempt backup folder under the retention directory. A rename works on
//! a running executable and leaves a journal entry the rollback can undo.

use crate::libs::archive;
use crate::libs::error::{UpdateError, UpdateResult};
use crate::libs::fs_ops::{self, FileOps};
use crate::libs::release::UpdateType;
use crate::libs::version;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Marks an incremental package when present at the root of the archive.
pub const MANIFEST_FILE: &str = "changes.json";
const SCRATCH_SUFFIX: &str = ".extracted";

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangesManifest {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub deleted: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Extracting,
    Classifying,
    Applying,
    CleaningUp,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Success {
        mode: UpdateType,
    },
    /// The install directory is unchanged; the new version lives at `path`.
    FallbackRecovered {
        path: PathBuf,
        mode: UpdateType,
        cause: String,
    },
}

/// Reads the manifest of an extracted package. `Ok(None)` means full package.
pub fn read_manifest(extracted: &Path) -> io::Result<Option<ChangesManifest>> {
    let path = extracted.join(MANIFEST_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let manifest = serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(manifest))
}

/// Scratch folder next to the artifact.
pub fn scratch_dir_for(artifact: &Path) -> PathBuf {
    let mut name = artifact.file_name().unwrap_or_default().to_owned();
    name.push(SCRATCH_SUFFIX);
    artifact.with_file_name(name)
}

/// `<install>-<version>` next to the install directory.
pub fn fallback_dir_for(target_dir: &Path, new_version: &str) -> PathBuf {
    let name = target_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "install".to_owned());
    target_dir.with_file_name(format!("{}-{}", name, version::normalize(new_version)))
}

/// Manifest entries are relative to the install root; anything else is ignored.
fn confined(rel: &str) -> Option<PathBuf> {
    let path = Path::new(rel.trim());
    let ok = !rel.trim().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    ok.then(|| path.to_path_buf())
}

enum JournalEntry {
    Created(PathBuf),
    CreatedDir(PathBuf),
    Replaced { target: PathBuf, backup: PathBuf },
}

/// Undo log of one apply attempt.
struct Journal<'a> {
    ops: &'a dyn FileOps,
    backup_dir: PathBuf,
    entries: Vec<JournalEntry>,
}

impl<'a> Journal<'a> {
    fn new(ops: &'a dyn FileOps, backup_dir: PathBuf) -> Self {
        Self {
            ops,
            backup_dir,
            entries: Vec::new(),
        }
    }

    fn ensure_parent(&mut self, path: &Path) -> io::Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let mut topmost = None;
        for dir in parent.ancestors() {
            if dir.as_os_str().is_empty() || dir.exists() {
                break;
            }
            topmost = Some(dir.to_path_buf());
        }
        if let Some(top) = topmost {
            self.ops.create_dir_all(parent)?;
            self.entries.push(JournalEntry::CreatedDir(top));
        }
        Ok(())
    }

    /// Renames an existing file into the backup folder.
    fn set_aside(&mut self, target: &Path, rel: &Path) -> io::Result<()> {
        let backup = self.backup_dir.join(rel);
        if let Some(parent) = backup.parent() {
            self.ops.create_dir_all(parent)?;
        }
        self.ops.rename(target, &backup)?;
        self.entries.push(JournalEntry::Replaced {
            target: target.to_path_buf(),
            backup,
        });
        Ok(())
    }

    fn remove(&mut self, target: &Path, rel: &Path) -> io::Result<()> {
        debug!(path = %target.display(), "removing");
        self.set_aside(target, rel)
    }

    fn write(&mut self, src: &Path, target: &Path, rel: &Path) -> io::Result<()> {
        self.ensure_parent(target)?;
        if target.exists() {
            self.set_aside(target, rel)?;
        } else {
            self.entries.push(JournalEntry::Created(target.to_path_buf()));
        }
        self.ops.copy_file(src, target)
    }

    /// Restores every journaled path, newest first. Keeps going on errors.
    fn rollback(self) -> io::Result<()> {
        let mut failures = 0usize;
        for entry in self.entries.into_iter().rev() {
            let result = match &entry {
                JournalEntry::Created(path) => {
                    if path.exists() {
                        self.ops.remove_file(path)
                    } else {
                        Ok(())
                    }
                }
                JournalEntry::CreatedDir(dir) => {
                    if dir.exists() {
                        self.ops.remove_dir_all(dir)
                    } else {
                        Ok(())
                    }
                }
                JournalEntry::Replaced { target, backup } => {
                    if target.exists() {
                        if let Err(e) = self.ops.remove_file(target) {
                            warn!(path = %target.display(), error = %e, "rollback could not clear file");
                        }
                    }
                    self.ops.rename(backup, target)
                }
            };
            if let Err(e) = result {
                failures += 1;
                error!(error = %e, "rollback step failed");
            }
        }
        if failures > 0 {
            return Err(io::Error::other(format!("{} rollback step(s) failed", failures)));
        }
        Ok(())
    }
}

pub struct Installer {
    ops: Arc<dyn FileOps>,
    retention_dir: PathBuf,
}

impl Installer {
    pub fn new(ops: Arc<dyn FileOps>, retention_dir: impl Into<PathBuf>) -> Self {
        Self {
            ops,
            retention_dir: retention_dir.into(),
        }
    }

    pub fn retention_dir(&self) -> &Path {
        &self.retention_dir
    }

    /// Moves the artifact into the retention folder.
    pub fn retain_artifact(&self, artifact: &Path) -> io::Result<PathBuf> {
        fs_ops::retain(self.ops.as_ref(), &self.retention_dir, artifact)
    }

    /// Installs `artifact` over `target_dir`.
    ///
    /// Returns `ExtractFailed` when the archive cannot be unpacked (nothing is
    /// touched) and `ApplyFatal` only when the fallback install failed too.
    pub fn install(&self, artifact: &Path, target_dir: &Path, new_version: &str) -> UpdateResult<InstallOutcome> {
        let scratch = scratch_dir_for(artifact);
        fs_ops::remove_quietly(self.ops.as_ref(), &scratch);

        info!(phase = ?InstallPhase::Extracting, artifact = %artifact.display(), "installing {}", new_version);
        if let Err(e) = archive::extract_archive(artifact, &scratch) {
            fs_ops::remove_quietly(self.ops.as_ref(), &scratch);
            return Err(UpdateError::ExtractFailed {
                artifact: artifact.to_path_buf(),
                detail: e.to_string(),
            });
        }

        match self.apply_and_clean(artifact, &scratch, target_dir, new_version) {
            Ok(mode) => {
                info!(mode = ?mode, target = %target_dir.display(), "update installed");
                Ok(InstallOutcome::Success { mode })
            }
            Err(cause) => {
                warn!(cause = %cause, "in-place install failed, installing side by side");
                self.fallback(artifact, &scratch, target_dir, new_version, cause)
            }
        }
    }

    fn apply_and_clean(&self, artifact: &Path, scratch: &Path, target_dir: &Path, new_version: &str) -> Result<UpdateType, String> {
        debug!(phase = ?InstallPhase::Classifying);
        let manifest = read_manifest(scratch).map_err(|e| format!("unreadable {}: {}", MANIFEST_FILE, e))?;
        let mode = if manifest.is_some() {
            UpdateType::Incremental
        } else {
            UpdateType::Full
        };

        debug!(phase = ?InstallPhase::Applying, mode = ?mode);
        let mut journal = Journal::new(self.ops.as_ref(), self.backup_dir(new_version));
        let applied = match &manifest {
            Some(manifest) => apply_incremental(&mut journal, scratch, target_dir, manifest),
            None => apply_full(&mut journal, scratch, target_dir),
        };
        if let Err(e) = applied {
            restore(journal);
            return Err(format!("apply failed: {}", e));
        }

        debug!(phase = ?InstallPhase::CleaningUp);
        if let Err(e) = self.clean_up(artifact, scratch) {
            restore(journal);
            return Err(format!("cleanup failed: {}", e));
        }
        Ok(mode)
    }

    fn clean_up(&self, artifact: &Path, scratch: &Path) -> io::Result<()> {
        self.ops.remove_dir_all(scratch)?;
        self.retain_artifact(artifact)?;
        Ok(())
    }

    fn backup_dir(&self, new_version: &str) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d-%H%M%S%3f");
        let base = format!("backup-{}-{}", version::normalize(new_version), stamp);
        let mut dir = self.retention_dir.join(&base);
        let mut n = 1;
        while dir.exists() {
            dir = self.retention_dir.join(format!("{}-{}", base, n));
            n += 1;
        }
        dir
    }

    fn fallback(
        &self,
        artifact: &Path,
        scratch: &Path,
        target_dir: &Path,
        new_version: &str,
        cause: String,
    ) -> UpdateResult<InstallOutcome> {
        let sibling = fallback_dir_for(target_dir, new_version);
        info!(phase = ?InstallPhase::Fallback, path = %sibling.display(), "installing into side folder");

        let populated = self.populate_sibling(artifact, scratch, target_dir, &sibling);

        fs_ops::remove_quietly(self.ops.as_ref(), scratch);
        if artifact.exists() {
            if let Err(e) = self.retain_artifact(artifact) {
                warn!(artifact = %artifact.display(), error = %e, "could not retain artifact");
            }
        }

        match populated {
            Ok(mode) => Ok(InstallOutcome::FallbackRecovered {
                path: sibling,
                mode,
                cause,
            }),
            Err(e) => {
                error!(path = %sibling.display(), error = %e, "side-by-side install failed");
                Err(UpdateError::ApplyFatal {
                    detail: format!("{} (side-by-side install into {} failed: {})", cause, sibling.display(), e),
                })
            }
        }
    }

    fn populate_sibling(&self, artifact: &Path, scratch: &Path, target_dir: &Path, sibling: &Path) -> io::Result<UpdateType> {
        let ops = self.ops.as_ref();
        if !scratch.is_dir() {
            archive::extract_archive(artifact, scratch)?;
        }

        match read_manifest(scratch)? {
            Some(manifest) => {
                if target_dir.is_dir() {
                    fs_ops::copy_tree(ops, target_dir, sibling, &[])?;
                }
                for rel in manifest.deleted.iter().filter_map(|r| confined(r)) {
                    let path = sibling.join(rel);
                    if path.is_file() {
                        ops.remove_file(&path)?;
                    }
                }
                fs_ops::copy_tree(ops, scratch, sibling, &[MANIFEST_FILE])?;
                Ok(UpdateType::Incremental)
            }
            None => {
                fs_ops::copy_tree(ops, scratch, sibling, &[MANIFEST_FILE])?;
                Ok(UpdateType::Full)
            }
        }
    }
}

fn restore(journal: Journal<'_>) {
    if let Err(e) = journal.rollback() {
        error!(error = %e, "install directory could not be fully restored");
    }
}

fn apply_incremental(journal: &mut Journal<'_>, scratch: &Path, target_dir: &Path, manifest: &ChangesManifest) -> io::Result<()> {
    for raw in &manifest.deleted {
        let Some(rel) = confined(raw) else {
            warn!(path = %raw, "ignoring manifest entry outside the install root");
            continue;
        };
        let path = target_dir.join(&rel);
        if path.is_file() {
            journal.remove(&path, &rel)?;
        }
    }
    copy_files(journal, scratch, target_dir)
}

fn apply_full(journal: &mut Journal<'_>, scratch: &Path, target_dir: &Path) -> io::Result<()> {
    copy_files(journal, scratch, target_dir)
}

fn copy_files(journal: &mut Journal<'_>, scratch: &Path, target_dir: &Path) -> io::Result<()> {
    for rel in fs_ops::walk_files(scratch)? {
        if fs_ops::is_skipped(&rel, &[MANIFEST_FILE]) {
            continue;
        }
        journal.write(&scratch.join(&rel), &target_dir.join(&rel), &rel)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::fs_ops::StdFileOps;

    #[test]
    fn manifest_fields_default_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), r#"{"deleted":["old.txt"]}"#).unwrap();
        let manifest = read_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(manifest.deleted, vec!["old.txt".to_string()]);
        assert!(manifest.added.is_empty());

        let empty = tempfile::tempdir().unwrap();
        assert!(read_manifest(empty.path()).unwrap().is_none());
    }

    #[test]
    fn layout_helpers() {
        assert_eq!(
            scratch_dir_for(Path::new("/d/app-1.2.0.zip")),
            PathBuf::from("/d/app-1.2.0.zip.extracted")
        );
        assert_eq!(fallback_dir_for(Path::new("/opt/app"), "v1.2.0"), PathBuf::from("/opt/app-1.2.0"));
    }

    #[test]
    fn confined_rejects_escapes() {
        assert!(confined("../outside.txt").is_none());
        assert!(confined("/etc/passwd").is_none());
        assert_eq!(confined("bin/app"), Some(PathBuf::from("bin/app")));
    }

    #[test]
    fn rollback_restores_replaced_and_created_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app");
        let src = dir.path().join("src");
        fs::create_dir_all(&target).unwrap();
        fs::create_dir_all(&src).unwrap();
        fs::write(target.join("a.txt"), "old").unwrap();
        fs::write(src.join("a.txt"), "new").unwrap();
        fs::write(src.join("b.txt"), "added").unwrap();

        let ops = StdFileOps;
        let mut journal = Journal::new(&ops, dir.path().join("backup"));
        journal.write(&src.join("a.txt"), &target.join("a.txt"), Path::new("a.txt")).unwrap();
        journal
            .write(&src.join("b.txt"), &target.join("sub/b.txt"), Path::new("sub/b.txt"))
            .unwrap();
        assert_eq!(fs::read_to_string(target.join("a.txt")).unwrap(), "new");

        journal.rollback().unwrap();
        assert_eq!(fs::read_to_string(target.join("a.txt")).unwrap(), "old");
        assert!(!target.join("sub").exists());
    }
}
