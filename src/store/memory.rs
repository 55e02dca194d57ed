// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The in-memory backend (spec.md §4.1): no durability, used for tests and
//! ephemeral indexes. Storage is a sequence of heap-allocated chunks held in
//! a chunk-indexed map, exactly like the mmap backend's chunk cache, minus
//! the file.

use super::backend::PageSource;
use crate::config::StoreConfig;
use crate::Result;
use rustc_hash::FxHashMap;

/// Growth unit for the in-memory backend's chunk map.
const CHUNK_BYTES: usize = 1024 * 1024;

/// Heap-backed, non-durable [`PageSource`] used by the [`crate::config::Backend::Memory`] backend.
pub struct MemorySource {
    chunks: FxHashMap<u64, Vec<u8>>,
    len: u64,
}

impl MemorySource {
    /// An empty, zero-length source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: FxHashMap::default(),
            len: 0,
        }
    }

    fn chunk_for(&mut self, chunk_idx: u64) -> &mut Vec<u8> {
        self.chunks
            .entry(chunk_idx)
            .or_insert_with(|| vec![0u8; CHUNK_BYTES])
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for MemorySource {
    fn open(_config: &StoreConfig) -> Result<Self> {
        Ok(Self::new())
    }

    fn total_bytes(&self) -> u64 {
        self.len
    }

    fn grow_to(&mut self, new_len: u64) -> Result<()> {
        if new_len > self.len {
            self.len = new_len;
        }
        Ok(())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut remaining = buf;
        let mut pos = offset;

        while !remaining.is_empty() {
            let chunk_idx = pos / CHUNK_BYTES as u64;
            let chunk_off = (pos % CHUNK_BYTES as u64) as usize;
            let take = remaining.len().min(CHUNK_BYTES - chunk_off);

            if let Some(chunk) = self.chunks.get(&chunk_idx) {
                remaining[..take].copy_from_slice(&chunk[chunk_off..chunk_off + take]);
            } else {
                remaining[..take].fill(0);
            }

            remaining = &mut remaining[take..];
            pos += take as u64;
        }

        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut remaining = buf;
        let mut pos = offset;

        while !remaining.is_empty() {
            let chunk_idx = pos / CHUNK_BYTES as u64;
            let chunk_off = (pos % CHUNK_BYTES as u64) as usize;
            let take = remaining.len().min(CHUNK_BYTES - chunk_off);

            let chunk = self.chunk_for(chunk_idx);
            chunk[chunk_off..chunk_off + take].copy_from_slice(&remaining[..take]);

            remaining = &remaining[take..];
            pos += take as u64;
        }

        self.len = self.len.max(offset + buf.len() as u64);

        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn write_then_read_across_chunk_boundary() -> Result<()> {
        let mut src = MemorySource::new();
        let offset = CHUNK_BYTES as u64 - 4;
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];

        src.write(offset, &data)?;

        let mut out = [0u8; 8];
        src.read(offset, &mut out)?;
        assert_eq!(out, data);
        Ok(())
    }

    #[test]
    fn unwritten_region_reads_zero() -> Result<()> {
        let mut src = MemorySource::new();
        src.grow_to(4096)?;

        let mut out = [0xFFu8; 16];
        src.read(100, &mut out)?;
        assert_eq!(out, [0u8; 16]);
        Ok(())
    }
}
