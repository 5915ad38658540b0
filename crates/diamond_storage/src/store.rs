//! Typed snapshot operations on top of a [`SnapshotBackend`].

use crate::backend::SnapshotBackend;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use diamond_protocol::{ConfigKey, ConfigValue, Fingerprint, ServerAddressList};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// File holding the newline-delimited server address list.
pub const SERVER_ADDRESS_FILE: &str = "ServerAddress";

/// Directory holding the raw content of each key's last value.
pub const DATA_DIR: &str = "data";

/// Directory holding point-in-time snapshot records.
pub const SNAPSHOT_DIR: &str = "snapshot";

/// A point-in-time copy of a configuration value, as stored under
/// `snapshot/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Group of the key.
    pub group: String,
    /// Data ID of the key.
    pub data_id: String,
    /// Hex MD5 of `content`.
    pub md5: String,
    /// Wall-clock time the value was fetched, in Unix milliseconds.
    pub fetched_at_ms: u64,
    /// The configuration content.
    pub content: String,
}

/// Durable storage for the resolved server list and the last known values.
///
/// Disjoint writers (the resolver and the poll loop) touch disjoint files,
/// so the store needs no locking of its own.
#[derive(Clone)]
pub struct SnapshotStore {
    backend: Arc<dyn SnapshotBackend>,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("location", &self.backend.location())
            .finish()
    }
}

impl SnapshotStore {
    /// Creates a store over any backend.
    pub fn new(backend: Arc<dyn SnapshotBackend>) -> Self {
        Self { backend }
    }

    /// Creates a file-backed store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileBackend::new(root)))
    }

    /// Creates an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    /// Describes where the store lives.
    pub fn location(&self) -> String {
        self.backend.location()
    }

    /// Idempotently creates the root, `data/` and `snapshot/` directories.
    ///
    /// # Errors
    ///
    /// Fails if any directory cannot be created, including when a regular
    /// file already occupies one of the paths.
    pub fn ensure_directories(&self) -> StorageResult<()> {
        self.backend.ensure_dir(Path::new(""))?;
        self.backend.ensure_dir(Path::new(DATA_DIR))?;
        self.backend.ensure_dir(Path::new(SNAPSHOT_DIR))?;
        Ok(())
    }

    /// Atomically replaces the persisted server address list.
    pub fn write_server_addresses(&self, list: &ServerAddressList) -> StorageResult<()> {
        self.backend
            .write(Path::new(SERVER_ADDRESS_FILE), list.to_lines().as_bytes())
    }

    /// Reads the persisted server address list.
    ///
    /// Returns an empty list if nothing was persisted yet.
    pub fn read_server_addresses(&self) -> StorageResult<ServerAddressList> {
        match self.backend.read(Path::new(SERVER_ADDRESS_FILE))? {
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    StorageError::Corrupted(format!("{}: {}", SERVER_ADDRESS_FILE, e))
                })?;
                Ok(ServerAddressList::parse(&text))
            }
            None => Ok(ServerAddressList::default()),
        }
    }

    /// Persists the last known value of a key.
    ///
    /// An absent value removes whatever was stored for the key.
    pub fn write_config_snapshot(&self, key: &ConfigKey, value: &ConfigValue) -> StorageResult<()> {
        let data_path = data_path(key);
        let record_path = record_path(key);

        if !value.is_present() {
            self.backend.remove(&record_path)?;
            return self.backend.remove(&data_path);
        }

        let record = SnapshotRecord {
            group: key.group().to_string(),
            data_id: key.data_id().to_string(),
            md5: value.fingerprint().to_string(),
            fetched_at_ms: now_millis(),
            content: value.content().to_string(),
        };
        let encoded = serde_json::to_vec_pretty(&record)
            .map_err(|e| StorageError::Corrupted(format!("encode snapshot record: {}", e)))?;

        self.backend.write(&data_path, value.content().as_bytes())?;
        self.backend.write(&record_path, &encoded)
    }

    /// Reads the last known value of a key.
    ///
    /// The snapshot record is preferred; a record whose checksum doesn't match
    /// its content is ignored in favour of the raw `data/` file.
    pub fn read_config_snapshot(&self, key: &ConfigKey) -> StorageResult<Option<ConfigValue>> {
        if let Some(record) = self.read_snapshot_record(key)? {
            if Fingerprint::of(&record.content).as_str() == record.md5 {
                return Ok(Some(ConfigValue::new(record.content)));
            }
            warn!(key = %key, "snapshot record checksum mismatch, falling back to data file");
        }

        match self.backend.read(&data_path(key))? {
            Some(bytes) => {
                let content = String::from_utf8(bytes)
                    .map_err(|e| StorageError::Corrupted(format!("{}: {}", key, e)))?;
                Ok(Some(ConfigValue::new(content)))
            }
            None => Ok(None),
        }
    }

    /// Reads the point-in-time record of a key.
    ///
    /// An undecodable record is reported as missing.
    pub fn read_snapshot_record(&self, key: &ConfigKey) -> StorageResult<Option<SnapshotRecord>> {
        let Some(bytes) = self.backend.read(&record_path(key))? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(key = %key, error = %e, "ignoring undecodable snapshot record");
                Ok(None)
            }
        }
    }
}

fn data_path(key: &ConfigKey) -> PathBuf {
    Path::new(DATA_DIR)
        .join(escape_component(key.group()))
        .join(escape_component(key.data_id()))
}

fn record_path(key: &ConfigKey) -> PathBuf {
    Path::new(SNAPSHOT_DIR)
        .join(escape_component(key.group()))
        .join(format!("{}.json", escape_component(key.data_id())))
}

/// Escapes a key component into a single safe path component.
///
/// `[A-Za-z0-9_.-]` pass through; a leading `.` and every other byte become
/// `%XX`, so `.`/`..` and separators can never escape the directory.
fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, byte) in raw.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || byte == b'_'
            || byte == b'-'
            || (byte == b'.' && i > 0);
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
