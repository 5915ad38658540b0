//! # Diamond Protocol
//!
//! Configuration identities, values and wire rules for the Diamond client.
//!
//! This crate provides:
//! - `ConfigKey` identifying one configuration stream
//! - `ConfigValue` and its MD5 `Fingerprint`
//! - `ServerAddressList` with bootstrap-body parsing
//! - The config-fetch wire contract (URL, query, response decoding)
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod address;
mod error;
mod key;
mod value;
pub mod wire;

pub use address::{base_url, ServerAddressList};
pub use error::{ProtocolError, ProtocolResult};
pub use key::ConfigKey;
pub use value::{ConfigValue, Fingerprint};
