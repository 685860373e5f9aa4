//! Archive entry name decoding.
//!
//! An older archive writer could not store arbitrary UTF-8 names, so it
//! percent-encoded the name, base64-encoded the result and appended
//! [`LEGACY_SUFFIX`]. Such entries are indexed under their decoded name.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;

/// Marks an entry name as a legacy base64 payload.
pub const LEGACY_SUFFIX: &str = "%ZB64";

/// Whether the raw name denotes a directory marker rather than a file.
pub fn is_directory_marker(raw: &str) -> bool {
    raw.ends_with('/') || raw.ends_with('\\')
}

/// Decode a raw entry name into the name it is looked up by.
///
/// Names without the legacy suffix are returned unchanged. Returns `None`
/// when a legacy payload fails to decode; callers drop such entries.
pub fn decode_entry_name(raw: &str) -> Option<String> {
    let Some(payload) = raw.strip_suffix(LEGACY_SUFFIX) else {
        return Some(raw.to_string());
    };

    let bytes = STANDARD.decode(payload).ok()?;
    let encoded = String::from_utf8(bytes).ok()?;
    let decoded = percent_decode_str(&encoded).decode_utf8().ok()?;
    if decoded.is_empty() {
        return None;
    }
    Some(decoded.into_owned())
}

/// Encode a name the way the legacy writer did.
pub fn encode_legacy_name(name: &str) -> String {
    use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

    let percent = utf8_percent_encode(name, NON_ALPHANUMERIC).to_string();
    format!("{}{LEGACY_SUFFIX}", STANDARD.encode(percent))
}
