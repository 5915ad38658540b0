//! Snapshot backend trait definition.

use crate::error::StorageResult;
use std::path::Path;

/// A byte store addressed by paths relative to the store root.
///
/// # Invariants
///
/// - `write` is atomic: a concurrent or later `read` sees either the old
///   bytes or the new bytes, never a mix
/// - `read` of a missing path returns `Ok(None)`
/// - `remove` of a missing path succeeds
/// - Backends must be `Send + Sync`; callers guarantee a single writer per path
pub trait SnapshotBackend: Send + Sync {
    /// Creates a directory and its parents if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails or the path exists and is not a
    /// directory.
    fn ensure_dir(&self, path: &Path) -> StorageResult<()>;

    /// Reads a whole file, returning `None` if it doesn't exist.
    fn read(&self, path: &Path) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically replaces a file's contents, creating parents as needed.
    fn write(&self, path: &Path, data: &[u8]) -> StorageResult<()>;

    /// Removes a file if it exists.
    fn remove(&self, path: &Path) -> StorageResult<()>;

    /// Describes where the backend stores data, for logging.
    fn location(&self) -> String;
}
