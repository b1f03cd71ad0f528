//! Content digest used as the integrity anchor of an upload.

use md5::{Digest, Md5};

/// Returns the lower-case hex MD5 digest of `content`.
pub fn checksum_hex(content: &[u8]) -> String {
    hex::encode(Md5::digest(content))
}
