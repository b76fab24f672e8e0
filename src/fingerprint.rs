//! Resume fingerprint: the deterministic signature string stored as the
//! `.system-fileSignature` property on the remote file and used to find
//! it again on a later run (spec §3, §4.4).

/// `"<size> <mtime> <toCompress> <chunkSize> <canonical-path>"`, exactly
/// as spec §3 defines it. Two local files with an identical tuple of
/// these five fields are indistinguishable to resume; the CLI driver
/// checks for that collision across the batch before uploading anything
/// (spec §4.4, §8 scenario 6).
pub fn fingerprint(size: u64, mtime_unix_secs: u64, to_compress: bool, chunk_size: u64, canonical_path: &str) -> String {
    format!("{size} {mtime_unix_secs} {to_compress} {chunk_size} {canonical_path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_spec() {
        let fp = fingerprint(1024, 1700000000, true, 5 << 20, "/data/reads.fastq");
        assert_eq!(fp, "1024 1700000000 true 5242880 /data/reads.fastq");
    }

    #[test]
    fn differs_when_any_field_differs() {
        let base = fingerprint(1024, 1700000000, true, 5 << 20, "/data/reads.fastq");
        let other_size = fingerprint(2048, 1700000000, true, 5 << 20, "/data/reads.fastq");
        assert_ne!(base, other_size);
    }
}
