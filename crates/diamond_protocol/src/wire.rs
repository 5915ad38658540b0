//! Config-fetch wire contract.
//!
//! A value is fetched with
//! `GET <base>/diamond-server/config.co?dataId=<dataID>&group=<group>`:
//! - `200` carries the content, optionally checked by a `Content-MD5` header
//! - `404` means the configuration does not exist
//! - every other status is a failure

use crate::address::base_url;
use crate::error::{ProtocolError, ProtocolResult};
use crate::key::ConfigKey;
use crate::value::{ConfigValue, Fingerprint};

/// Path of the config endpoint on each server.
pub const CONFIG_PATH: &str = "/diamond-server/config.co";

/// Query parameter carrying the data ID.
pub const DATA_ID_PARAM: &str = "dataId";

/// Query parameter carrying the group.
pub const GROUP_PARAM: &str = "group";

/// Response header carrying the content checksum (lower-cased).
pub const CONTENT_MD5_HEADER: &str = "content-md5";

/// Builds the config URL for a server address.
pub fn config_url(server: &str) -> String {
    format!("{}{}", base_url(server), CONFIG_PATH)
}

/// Builds the query parameters for a key.
pub fn config_query(key: &ConfigKey) -> [(&'static str, &str); 2] {
    [(DATA_ID_PARAM, key.data_id()), (GROUP_PARAM, key.group())]
}

/// Decodes a config-fetch response.
pub fn decode_config_response(
    status: u16,
    content_md5: Option<&str>,
    body: String,
) -> ProtocolResult<ConfigValue> {
    match status {
        200..=299 => {
            if let Some(expected) = content_md5 {
                let actual = Fingerprint::of(&body);
                if !expected.trim().eq_ignore_ascii_case(actual.as_str()) {
                    return Err(ProtocolError::ChecksumMismatch {
                        expected: expected.trim().to_string(),
                        actual: actual.to_string(),
                    });
                }
            }
            Ok(ConfigValue::new(body))
        }
        404 => Ok(ConfigValue::absent()),
        status => Err(ProtocolError::UnexpectedStatus { status }),
    }
}
