//! Off-runtime snapshot writes.

use diamond_storage::{SnapshotStore, StorageError, StorageResult};
use std::io;

/// Runs a blocking store operation on the blocking pool.
pub(crate) async fn with_store<T, F>(store: &SnapshotStore, op: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce(&SnapshotStore) -> StorageResult<T> + Send + 'static,
{
    let store = store.clone();
    let location = store.location();
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .unwrap_or_else(|e| {
            Err(StorageError::Io {
                path: location.into(),
                source: io::Error::new(io::ErrorKind::Other, format!("storage task failed: {}", e)),
            })
        })
}
