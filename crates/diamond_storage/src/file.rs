//! File-based snapshot backend.

use crate::backend::SnapshotBackend;
use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A snapshot backend rooted at a directory on the local file system.
///
/// # Durability
///
/// Writes go to a temporary file in the destination directory, are synced
/// with `sync_all()` and then renamed over the destination. A crash leaves
/// either the previous file or the new one in place.
///
/// # Example
///
/// ```no_run
/// use diamond_storage::{FileBackend, SnapshotBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::new("/tmp/diamond");
/// backend.write(Path::new("ServerAddress"), b"s1:80\n").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Creates a backend rooted at `root`. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl SnapshotBackend for FileBackend {
    fn ensure_dir(&self, path: &Path) -> StorageResult<()> {
        let dir = self.resolve(path);
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => return Err(StorageError::NotADirectory(dir)),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(dir, e)),
        }
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))
    }

    fn read(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        let file = self.resolve(path);
        match fs::read(&file) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(file, e)),
        }
    }

    fn write(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let file = self.resolve(path);
        let parent = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).map_err(|e| StorageError::io(&parent, e))?;

        let mut temp = NamedTempFile::new_in(&parent).map_err(|e| StorageError::io(&parent, e))?;
        temp.write_all(data)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| StorageError::io(temp.path(), e))?;
        temp.persist(&file)
            .map_err(|e| StorageError::io(&file, e.error))?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        let file = self.resolve(path);
        match fs::remove_file(&file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(file, e)),
        }
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}
