//! Archive extraction for downloaded artifacts.
//!
//! `.tar.gz` / `.tgz` go through `tar` + `flate2`; everything else is treated
//! as ZIP. Entries that would escape the destination are skipped.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tar::Archive;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub fn detect(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else {
            ArchiveKind::Zip
        }
    }
}

/// Unpacks `archive` into `dest`, creating it if needed.
pub fn extract_archive(archive: &Path, dest: &Path) -> io::Result<()> {
    info!(archive = %archive.display(), dest = %dest.display(), "extracting");
    fs::create_dir_all(dest)?;
    match ArchiveKind::detect(archive) {
        ArchiveKind::TarGz => extract_tar_gz(archive, dest),
        ArchiveKind::Zip => extract_zip(archive, dest),
    }
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> io::Result<()> {
    let file = File::open(archive)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    // unpack() refuses entries with `..` or absolute paths
    archive.unpack(dest)
}

fn extract_zip(archive: &Path, dest: &Path) -> io::Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(io::Error::other)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(io::Error::other)?;
        let Some(rel) = entry.enclosed_name() else {
            debug!(name = entry.name(), "skipping entry outside the archive root");
            continue;
        };
        let out = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut target = File::create(&out)?;
        io::copy(&mut entry, &mut target)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}
