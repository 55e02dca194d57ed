// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The file header (spec.md §3.1, §6.1): a fixed 16 KiB region split into a
//! caller-owned "extra header" and a common trailer the store itself reads
//! and writes.

use crate::buf::PageView;
use crate::Result;

/// Total size of the file header region.
pub const HEADER_BYTES: u64 = 16_384;

/// Size of the common trailer the store maintains.
pub const COMMON_TRAILER_BYTES: usize = 64;

/// Size of the caller-owned extra header region preceding the trailer.
pub const EXTRA_HEADER_BYTES: usize = HEADER_BYTES as usize - COMMON_TRAILER_BYTES;

/// Byte offset of the common trailer within the header region.
pub const TRAILER_OFFSET: usize = EXTRA_HEADER_BYTES;

/// Wire format version the store currently writes.
pub const CURRENT_VERSION: i16 = 1;

/// The store-owned portion of the file header: free-list head, geometry and
/// record count. Mirrors spec.md §6.1's byte-exact layout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CommonTrailer {
    /// Head of the free list, `-1` if empty.
    pub free_list_head: i64,
    /// Wire format version the file was written with.
    pub version: i16,
    /// Growth increment this store was opened with.
    pub increment_bytes: u32,
    /// User block payload size this store was opened with.
    pub block_data_bytes: i16,
    /// Number of allocated head blocks (logical records).
    pub count: i64,
}

impl CommonTrailer {
    /// A trailer for a freshly created, empty file.
    #[must_use]
    pub fn fresh(block_data_bytes: i16, increment_bytes: u32) -> Self {
        Self {
            free_list_head: -1,
            version: CURRENT_VERSION,
            increment_bytes,
            block_data_bytes,
            count: 0,
        }
    }

    /// Serializes this trailer into a fixed-size buffer.
    pub fn encode(&self, out: &mut [u8; COMMON_TRAILER_BYTES]) -> Result<()> {
        let mut view = PageView::new(out);
        view.put_i64le(0)?; // reserved
        view.put_i64le(self.free_list_head)?;
        view.put_i64le(0)?; // reserved tail
        view.put_i16le(self.version)?;
        #[allow(clippy::cast_possible_wrap)]
        view.put_i32le(self.increment_bytes as i32)?;
        view.put_bytes(&[0u8; 24])?; // reserved
        view.put_i16le(self.block_data_bytes)?;
        view.put_i64le(self.count)?;
        Ok(())
    }

    /// Parses a trailer out of a buffer previously produced by [`CommonTrailer::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut scratch = [0u8; COMMON_TRAILER_BYTES];
        scratch.copy_from_slice(&bytes[..COMMON_TRAILER_BYTES]);
        let mut view = PageView::new(&mut scratch);

        let _reserved = view.get_i64le()?;
        let free_list_head = view.get_i64le()?;
        let _reserved_tail = view.get_i64le()?;
        let version = view.get_i16le()?;
        let increment_bytes = view.get_i32le()?;
        let _reserved = view.get_bytes(24)?;
        let block_data_bytes = view.get_i16le()?;
        let count = view.get_i64le()?;

        #[allow(clippy::cast_sign_loss)]
        Ok(Self {
            free_list_head,
            version,
            increment_bytes: increment_bytes as u32,
            block_data_bytes,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn trailer_roundtrip() -> Result<()> {
        let trailer = CommonTrailer {
            free_list_head: 42,
            version: CURRENT_VERSION,
            increment_bytes: 16 * 1024 * 1024,
            block_data_bytes: 4080,
            count: 1000,
        };

        let mut bytes = [0u8; COMMON_TRAILER_BYTES];
        trailer.encode(&mut bytes)?;

        let decoded = CommonTrailer::decode(&bytes)?;
        assert_eq!(trailer, decoded);
        Ok(())
    }

    #[test]
    fn fresh_trailer_has_no_free_list() {
        let trailer = CommonTrailer::fresh(4080, 16 * 1024 * 1024);
        assert_eq!(trailer.free_list_head, -1);
        assert_eq!(trailer.count, 0);
    }
}
