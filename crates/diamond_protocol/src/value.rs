//! Configuration values and fingerprints.

use std::fmt;

/// Fingerprint used for values the server reports as not found.
///
/// Never collides with an MD5 hex digest, which is always 32 hex characters.
const ABSENT_FINGERPRINT: &str = "absent";

/// A comparable digest of a configuration value.
///
/// Present values are fingerprinted with the lower-case hex MD5 of their
/// content, matching the `Content-MD5` header servers send.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of some content.
    pub fn of(content: &str) -> Self {
        Self(format!("{:x}", md5::compute(content.as_bytes())))
    }

    /// The fingerprint of an absent value.
    pub fn absent() -> Self {
        Self(ABSENT_FINGERPRINT.to_string())
    }

    /// Returns the fingerprint as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A configuration payload together with its fingerprint.
///
/// "Not found" is a value, not an error: [`ConfigValue::absent`] carries an
/// empty content and a dedicated fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue {
    content: String,
    fingerprint: Fingerprint,
    present: bool,
}

impl ConfigValue {
    /// Creates a present value, computing its fingerprint.
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let fingerprint = Fingerprint::of(&content);
        Self {
            content,
            fingerprint,
            present: true,
        }
    }

    /// Creates the value for a configuration the server does not know.
    pub fn absent() -> Self {
        Self {
            content: String::new(),
            fingerprint: Fingerprint::absent(),
            present: false,
        }
    }

    /// Returns the content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the fingerprint.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Returns true if the server reported a value.
    pub fn is_present(&self) -> bool {
        self.present
    }
}
