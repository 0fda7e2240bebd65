//! Directory-tree compression and extraction.

use std::fs::File;
use std::io;
use std::path::Path;

use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Error, Debug)]
pub enum ZipperError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),

    #[error("archive entry escapes the target directory: {0}")]
    PathEscape(String),
}

pub type Result<T> = std::result::Result<T, ZipperError>;

/// Freeze the tree under `source` into a zip file at `target`.
///
/// Entry names are relative to `source` (no base directory). The archive is
/// fsynced before returning so callers may treat it as durable.
pub fn zip_dir(source: &Path, target: &Path) -> Result<()> {
    let file = File::create(target)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .expect("walkdir yields paths under its root");
        if rel.as_os_str().is_empty() {
            continue;
        }
        let name = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut src = File::open(entry.path())?;
            io::copy(&mut src, &mut writer)?;
        }
    }

    let file = writer.finish()?;
    file.sync_all()?;
    Ok(())
}

/// Expand the zip file at `archive` into `target`, creating it if needed.
pub fn unzip(archive: &Path, target: &Path) -> Result<()> {
    let mut reader = ZipArchive::new(File::open(archive)?)?;
    std::fs::create_dir_all(target)?;

    for i in 0..reader.len() {
        let mut entry = reader.by_index(i)?;
        // enclosed_name rejects absolute paths and `..` components
        let rel = entry
            .enclosed_name()
            .ok_or_else(|| ZipperError::PathEscape(entry.name().to_string()))?;
        let out = target.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut dest = File::create(&out)?;
        io::copy(&mut entry, &mut dest)?;
    }

    Ok(())
}

/// Remove every entry in `dir`, files and subtrees alike.
pub fn clear_dir(dir: &Path) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
