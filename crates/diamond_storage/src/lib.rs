//! # Diamond Storage
//!
//! Local snapshot store for the Diamond client.
//!
//! The store keeps the last resolved server-address list and the last
//! fetched value of each configuration key on disk, so a restarted process
//! can serve stale data while the network is unavailable.
//!
//! ## Layout
//!
//! ```text
//! <root>/ServerAddress                     newline-delimited address list
//! <root>/data/<group>/<dataId>             raw content of the last value
//! <root>/snapshot/<group>/<dataId>.json    point-in-time record with checksum
//! ```
//!
//! ## Design Principles
//!
//! - Every write goes to a temporary file that is renamed into place, so
//!   readers never observe a partial file
//! - Missing files are "nothing stored yet", never an error
//! - Backends are opaque byte stores addressed by relative paths
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - Persistent storage rooted at a directory
//! - [`InMemoryBackend`] - For testing, with write-failure injection

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod store;

pub use backend::SnapshotBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use store::{
    SnapshotRecord, SnapshotStore, DATA_DIR, SERVER_ADDRESS_FILE, SNAPSHOT_DIR,
};
