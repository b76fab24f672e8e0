//! Content-MD5 helpers.
//!
//! The teacher SDK hashes with SHA-1 for UCloud's HMAC signature and
//! ETag scheme. Every hash this crate needs is an MD5 of chunk bytes
//! (per-part `Content-MD5` header, verifier comparisons), so this module
//! is generalized to MD5 while keeping the "one pure function over
//! `AsRef<[u8]>`" shape.

/// Raw MD5 digest of `source`.
pub fn md5(source: impl AsRef<[u8]>) -> [u8; 16] {
    md5::compute(source).0
}

/// Lowercase hex MD5 digest, the form the platform expects in
/// `Content-MD5` and in part-manifest entries.
pub fn md5_hex(source: impl AsRef<[u8]>) -> String {
    format!("{:x}", md5::compute(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_matches_known_vector() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }
}
