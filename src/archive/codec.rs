//! Archive codec: directory trees to and from a single `.tar.gz` file
//!
//! Each source directory becomes one top-level entry of the archive, named
//! after the directory. Unpacking recreates those entries under the
//! destination directory.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

use crate::error::{BackupError, BackupResult};

/// Pack `sources` into `dest_archive`, returning the archive size in bytes
pub fn pack(sources: &[&Path], dest_archive: &Path) -> BackupResult<u64> {
    for source in sources {
        if !source.is_dir() {
            return Err(BackupError::Io(format!(
                "Archive source not found: {}",
                source.display()
            )));
        }
    }

    let file = File::create(dest_archive).map_err(|e| {
        BackupError::Io(format!(
            "Failed to create archive {}: {}",
            dest_archive.display(),
            e
        ))
    })?;

    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    for source in sources {
        let entry_name = source.file_name().ok_or_else(|| {
            BackupError::Io(format!("Archive source has no name: {}", source.display()))
        })?;
        builder.append_dir_all(entry_name, source).map_err(|e| {
            BackupError::Io(format!("Failed to archive {}: {}", source.display(), e))
        })?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| BackupError::Io(format!("Failed to finish archive: {}", e)))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| BackupError::Io(format!("Failed to compress archive: {}", e)))?;
    writer
        .flush()
        .map_err(|e| BackupError::Io(format!("Failed to flush archive: {}", e)))?;
    drop(writer);

    let size = fs::metadata(dest_archive)
        .map_err(|e| BackupError::Io(format!("Failed to stat archive: {}", e)))?
        .len();
    Ok(size)
}

/// Unpack `archive` into `dest_dir`, returning the number of entries
///
/// Any decoding failure, or an entry that would land outside `dest_dir`,
/// is reported as [`BackupError::CorruptArchive`]. The caller owns cleanup of
/// a partially populated `dest_dir`.
pub fn unpack(archive: &Path, dest_dir: &Path) -> BackupResult<usize> {
    let file = File::open(archive).map_err(|e| {
        BackupError::Io(format!("Failed to open archive {}: {}", archive.display(), e))
    })?;
    fs::create_dir_all(dest_dir)
        .map_err(|e| BackupError::Io(format!("Failed to create {}: {}", dest_dir.display(), e)))?;

    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.set_preserve_permissions(true);

    let corrupt = |e: std::io::Error| BackupError::CorruptArchive(format!("{}: {}", archive.display(), e));

    let mut count = 0;
    for entry in tar.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let path = entry.path().map_err(corrupt)?.into_owned();

        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(BackupError::CorruptArchive(format!(
                "entry escapes destination: {}",
                path.display()
            )));
        }

        let inside = entry.unpack_in(dest_dir).map_err(corrupt)?;
        if !inside {
            return Err(BackupError::CorruptArchive(format!(
                "entry escapes destination: {}",
                path.display()
            )));
        }
        count += 1;
    }

    if count == 0 {
        return Err(BackupError::CorruptArchive(format!(
            "{}: archive is empty",
            archive.display()
        )));
    }

    Ok(count)
}
