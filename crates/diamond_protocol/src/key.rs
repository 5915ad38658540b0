//! Configuration key.

use crate::error::{ProtocolError, ProtocolResult};
use std::fmt;

/// Identity of one configuration value stream: a `(group, dataID)` pair.
///
/// Keys are created once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    group: String,
    data_id: String,
}

impl ConfigKey {
    /// Creates a key, rejecting blank components.
    pub fn new(group: impl Into<String>, data_id: impl Into<String>) -> ProtocolResult<Self> {
        let group = group.into();
        let data_id = data_id.into();

        if group.trim().is_empty() {
            return Err(ProtocolError::InvalidKey("group must not be blank".into()));
        }
        if data_id.trim().is_empty() {
            return Err(ProtocolError::InvalidKey("dataID must not be blank".into()));
        }

        Ok(Self { group, data_id })
    }

    /// Returns the group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the data ID.
    pub fn data_id(&self) -> &str {
        &self.data_id
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.data_id)
    }
}
