//! Local archive directory: enumeration, validation, deletion.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::archive::{matches_convention, ArchiveRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("backup file {0} does not exist")]
    NotFound(String),

    #[error("invalid archive name: {0}")]
    InvalidName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A flat directory of archives named by the convention in
/// [`crate::models::archive`].
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    dir: PathBuf,
}

impl ArchiveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve `name` inside the archive directory, rejecting anything that
    /// is not a bare file name.
    pub fn join(&self, name: &str) -> Result<PathBuf> {
        let is_bare = Path::new(name)
            .file_name()
            .is_some_and(|f| f == std::ffi::OsStr::new(name));
        if name.is_empty() || !is_bare {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.join(name)?.is_file())
    }

    pub fn size(&self, name: &str) -> Result<u64> {
        let path = self.join(name)?;
        let meta =
            std::fs::metadata(&path).map_err(|_| StoreError::NotFound(name.to_string()))?;
        Ok(meta.len())
    }

    /// Archive file names matching the naming convention, sorted.
    /// Non-matching files are silently excluded.
    pub fn list(&self) -> Result<Vec<String>> {
        std::fs::create_dir_all(&self.dir)?;
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if matches_convention(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete `name`, reporting its record as it was prior to removal.
    /// The file must exist; a missing archive is an explicit error and no
    /// filesystem mutation happens.
    pub fn delete(&self, name: &str) -> Result<ArchiveRecord> {
        let path = self.join(name)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let size = std::fs::metadata(&path)?.len();
        std::fs::remove_file(&path)?;
        tracing::info!(archive = %name, size, "archive deleted");
        Ok(ArchiveRecord {
            file_name: name.to_string(),
            size,
        })
    }
}
