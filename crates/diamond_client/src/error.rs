//! Error types for the Diamond client.

use diamond_protocol::ProtocolError;
use diamond_storage::StorageError;
use thiserror::Error;

/// Result type for client operations.
pub type DiamondResult<T> = Result<T, DiamondError>;

/// Errors that can occur in the Diamond client.
///
/// Only construction-time failures and `Timeout` ever reach callers; the
/// background subscribers absorb everything else and keep running.
#[derive(Error, Debug)]
pub enum DiamondError {
    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local directory or file I/O failed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    /// The bootstrap endpoint could not produce a server list.
    #[error("server address resolution failed{}: {message}", status_suffix(.status))]
    ResolutionFailed {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Error message.
        message: String,
    },

    /// Fetching configuration from one server failed.
    #[error("fetch from {server} failed{}: {message}", status_suffix(.status))]
    FetchFailed {
        /// The server that was asked.
        server: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Error message.
        message: String,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (unexpected response shape).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A watcher reported a failure or panicked.
    #[error("watcher #{index} failed: {message}")]
    WatcherFailure {
        /// Registration index of the watcher.
        index: usize,
        /// Error message.
        message: String,
    },

    /// No value arrived in time.
    #[error("operation timed out")]
    Timeout,

    /// Nothing is known yet for the key, neither live nor from a snapshot.
    #[error("configuration not yet available")]
    NotYetAvailable,

    /// The manager has been shut down.
    #[error("diamond manager is shut down")]
    ShutDown,
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" with status {}", status),
        None => String::new(),
    }
}

impl DiamondError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            DiamondError::Transport { retryable, .. } => *retryable,
            DiamondError::Timeout => true,
            DiamondError::ResolutionFailed { status, .. }
            | DiamondError::FetchFailed { status, .. } => match status {
                Some(code) => *code >= 500,
                None => true,
            },
            _ => false,
        }
    }
}
