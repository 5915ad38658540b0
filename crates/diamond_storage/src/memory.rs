//! In-memory snapshot backend for testing.

use crate::backend::SnapshotBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An in-memory snapshot backend.
///
/// Suitable for unit tests. Writes can be made to fail on demand to exercise
/// the "log and keep going" paths of callers.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    files: RwLock<HashMap<PathBuf, Vec<u8>>>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of successful writes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SnapshotBackend for InMemoryBackend {
    fn ensure_dir(&self, _path: &Path) -> StorageResult<()> {
        Ok(())
    }

    fn read(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.files.read().get(path).cloned())
    }

    fn write(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::io(
                path,
                io::Error::new(io::ErrorKind::Other, "injected write failure"),
            ));
        }
        self.files.write().insert(path.to_path_buf(), data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        self.files.write().remove(path);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".into()
    }
}
