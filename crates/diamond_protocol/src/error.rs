//! Error types for protocol handling.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or decoding protocol messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A configuration key component is blank.
    #[error("invalid config key: {0}")]
    InvalidKey(String),

    /// The server answered with a status the protocol does not accept.
    #[error("unexpected status {status}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
    },

    /// The body does not match the checksum announced by the server.
    #[error("content checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Checksum sent by the server.
        expected: String,
        /// Checksum computed over the received body.
        actual: String,
    },
}
