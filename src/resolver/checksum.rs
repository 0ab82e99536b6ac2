//! Script checksums.
//!
//! CRC-32 (IEEE) over the script's lines without their terminators, so the
//! value is the same whichever line endings a checkout produced. A leading
//! byte order mark is ignored.

use crc32fast::Hasher;

/// Checksum of a script as stored in the history table.
pub fn checksum(content: &str) -> i32 {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut hasher = Hasher::new();
    // str::lines splits on \n and strips a trailing \r; lone \r are line breaks too
    for line in content.lines().flat_map(|l| l.split('\r')) {
        hasher.update(line.as_bytes());
    }
    hasher.finalize() as i32
}

/// Plain CRC-32 of a byte string.
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}
