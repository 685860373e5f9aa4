//! Archive and token fixtures.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::io::{Cursor, Write};
use time::OffsetDateTime;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build a deflated archive in memory.
#[allow(dead_code)]
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Seconds since the Unix epoch, offset by `delta`.
#[allow(dead_code)]
pub fn epoch_in(delta: i64) -> i64 {
    OffsetDateTime::now_utc().unix_timestamp() + delta
}

/// Characters escaped in a token path segment: everything outside the
/// RFC 3986 unreserved set, which covers base64's `+`, `/` and `=`.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a value for use as one path segment.
#[allow(dead_code)]
pub fn path_escape(encoded: &str) -> String {
    utf8_percent_encode(encoded, SEGMENT).to_string()
}
