//! A `Chunk` is a contiguous byte range of a local file, identified by
//! `(file_index, part_index)`. Generalizes the teacher's `ChunkFile`
//! (which only carried bytes+offset+size) into the full mutable unit the
//! pipeline moves between stages: it owns its buffer outright so Rust's
//! move semantics give us, for free, the spec's "never in two queues
//! simultaneously" invariant.

use bytes::Bytes;

/// `partIndex` is 1-based per spec §3.
pub type PartIndex = u64;

#[derive(Debug, Clone)]
pub struct Chunk {
    pub file_index: usize,
    pub part_index: PartIndex,
    pub start: u64,
    pub end: u64,
    pub last_chunk: bool,
    /// Populated by the Read stage, consumed (and cleared) by Compress
    /// or Upload; `None` whenever the chunk is in flight without data
    /// (e.g. just enqueued to Read, or just after a successful upload).
    pub data: Option<Bytes>,
    pub tries_left: u32,
    pub host_name: Option<String>,
    pub resolved_ip: Option<std::net::IpAddr>,
}

impl Chunk {
    pub fn new(file_index: usize, part_index: PartIndex, start: u64, end: u64, last_chunk: bool, tries_left: u32) -> Self {
        debug_assert!(start <= end);
        Self {
            file_index,
            part_index,
            start,
            end,
            last_chunk,
            data: None,
            tries_left,
            host_name: None,
            resolved_ip: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Releases the buffer; called immediately after a successful upload
    /// or before a retry re-enters the Read queue (spec §3).
    pub fn clear_data(&mut self) {
        self.data = None;
    }

    pub fn force_dns_refresh(&mut self) {
        self.resolved_ip = None;
    }
}

/// Recomputes the byte range for a single 1-indexed part without
/// enumerating the whole file, used by the completion repair pass to
/// rebuild only the chunks the server still reports incomplete.
pub fn chunk_range(file_size: u64, chunk_size: u64, part_index: PartIndex) -> (u64, u64, bool) {
    if file_size == 0 {
        return (0, 0, true);
    }
    let start = (part_index - 1) * chunk_size;
    let end = (start + chunk_size).min(file_size);
    (start, end, end == file_size)
}

/// Splits a file of `file_size` bytes into 1-indexed chunks of at most
/// `chunk_size` bytes each. Only the last chunk of a non-empty file may
/// be shorter than `chunk_size` (spec §3). A zero-length file still
/// produces exactly one (empty) part at index 1 (spec §4.7, §8).
pub fn enumerate_chunks(file_index: usize, file_size: u64, chunk_size: u64, tries: u32) -> Vec<Chunk> {
    assert!(chunk_size > 0, "chunk_size must be positive");
    if file_size == 0 {
        return vec![Chunk::new(file_index, 1, 0, 0, true, tries)];
    }
    let mut chunks = Vec::with_capacity(file_size.div_ceil(chunk_size) as usize);
    let mut start = 0u64;
    let mut part_index: PartIndex = 1;
    while start < file_size {
        let end = (start + chunk_size).min(file_size);
        let last_chunk = end == file_size;
        chunks.push(Chunk::new(file_index, part_index, start, end, last_chunk, tries));
        start = end;
        part_index += 1;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_file_has_one_empty_part() {
        let chunks = enumerate_chunks(0, 0, 5 << 20, 3);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].part_index, 1);
        assert!(chunks[0].is_empty());
        assert!(chunks[0].last_chunk);
    }

    #[test]
    fn file_exactly_chunk_size_is_one_part() {
        let chunks = enumerate_chunks(0, 5 << 20, 5 << 20, 3);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].last_chunk);
        assert_eq!(chunks[0].len(), 5 << 20);
    }

    #[test]
    fn twelve_mib_with_five_mib_chunks_is_three_parts() {
        let chunk_size = 5u64 << 20;
        let file_size = 12u64 << 20;
        let chunks = enumerate_chunks(0, file_size, chunk_size, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), chunk_size);
        assert_eq!(chunks[1].len(), chunk_size);
        assert_eq!(chunks[2].len(), 2 << 20);
        assert!(!chunks[0].last_chunk);
        assert!(!chunks[1].last_chunk);
        assert!(chunks[2].last_chunk);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.part_index, (i + 1) as u64);
            assert!(c.start <= c.end);
            assert!(c.end - c.start <= chunk_size);
        }
    }

    #[test]
    fn part_count_matches_ceil_division() {
        let chunk_size = 7u64;
        let file_size = 50u64;
        let chunks = enumerate_chunks(0, file_size, chunk_size, 3);
        assert_eq!(chunks.len(), file_size.div_ceil(chunk_size) as usize);
        assert_eq!(chunks.last().unwrap().len(), file_size % chunk_size);
    }
}
