// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The 16-byte block header (spec.md §3.1, §6.2).

use crate::buf::PageView;
use crate::{Error, Result};

/// Size in bytes of a block's fixed header.
pub const BLOCK_HEADER_BYTES: usize = 16;

/// A block's allocation status.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    /// Block holds live data.
    Allocated,
    /// Block is on the free list.
    Free,
}

impl Status {
    const ALLOCATED: u8 = b'+';
    const FREE: u8 = b'-';

    fn to_byte(self) -> u8 {
        match self {
            Self::Allocated => Self::ALLOCATED,
            Self::Free => Self::FREE,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            Self::ALLOCATED => Ok(Self::Allocated),
            Self::FREE => Ok(Self::Free),
            _ => Err(Error::BadChain),
        }
    }
}

/// What kind of chain member a block is.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mark {
    /// Head of a record's overflow chain.
    Data,
    /// A non-head continuation block.
    Next,
    /// Free / not part of any chain.
    Unused,
}

impl Mark {
    const DATA: u8 = b'D';
    const NEXT: u8 = b'N';
    const UNUSED: u8 = b'X';

    fn to_byte(self) -> u8 {
        match self {
            Self::Data => Self::DATA,
            Self::Next => Self::NEXT,
            Self::Unused => Self::UNUSED,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            Self::DATA => Ok(Self::Data),
            Self::NEXT => Ok(Self::Next),
            Self::UNUSED => Ok(Self::Unused),
            _ => Err(Error::BadChain),
        }
    }
}

/// The 16-byte header prefixing every block's payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    /// Whether this block is allocated or free.
    pub status: Status,
    /// What kind of chain member this block is.
    pub mark: Mark,
    /// Bytes of payload stored in *this* block.
    pub chunk_length: i16,
    /// Record-wide length; only meaningful on the head block.
    pub total_length: i32,
    /// Free-list link (when free) or overflow chain link (when allocated).
    /// `-1` terminates.
    pub next_block_index: i64,
}

impl BlockHeader {
    /// A free-block header linking to `next_block_index` on the free list.
    #[must_use]
    pub fn free_with_next(next_block_index: i64) -> Self {
        Self {
            status: Status::Free,
            mark: Mark::Unused,
            chunk_length: 0,
            total_length: 0,
            next_block_index,
        }
    }

    /// Whether this header's status is [`Status::Allocated`].
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.status == Status::Allocated
    }

    /// Serializes this header into a fixed-size buffer.
    pub fn encode(&self, out: &mut [u8; BLOCK_HEADER_BYTES]) -> Result<()> {
        let mut view = PageView::new(out);
        view.put_u8(self.status.to_byte())?;
        view.put_u8(self.mark.to_byte())?;
        view.put_i16le(self.chunk_length)?;
        view.put_i32le(self.total_length)?;
        view.put_i64le(self.next_block_index)?;
        Ok(())
    }

    /// Parses a header out of a buffer previously produced by [`BlockHeader::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BLOCK_HEADER_BYTES {
            return Err(Error::BadChain);
        }
        let mut scratch = [0u8; BLOCK_HEADER_BYTES];
        scratch.copy_from_slice(&bytes[..BLOCK_HEADER_BYTES]);
        let mut view = PageView::new(&mut scratch);

        let status = Status::from_byte(view.get_u8()?)?;
        let mark = Mark::from_byte(view.get_u8()?)?;
        let chunk_length = view.get_i16le()?;
        let total_length = view.get_i32le()?;
        let next_block_index = view.get_i64le()?;

        Ok(Self {
            status,
            mark,
            chunk_length,
            total_length,
            next_block_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn header_roundtrip() -> Result<()> {
        let header = BlockHeader {
            status: Status::Allocated,
            mark: Mark::Data,
            chunk_length: 4080,
            total_length: 10_000,
            next_block_index: 7,
        };

        let mut bytes = [0u8; BLOCK_HEADER_BYTES];
        header.encode(&mut bytes)?;

        assert_eq!(bytes[0], b'+');
        assert_eq!(bytes[1], b'D');

        let decoded = BlockHeader::decode(&bytes)?;
        assert_eq!(header, decoded);
        Ok(())
    }

    #[test]
    fn free_block_roundtrip() -> Result<()> {
        let header = BlockHeader::free_with_next(-1);
        let mut bytes = [0u8; BLOCK_HEADER_BYTES];
        header.encode(&mut bytes)?;
        assert_eq!(bytes[0], b'-');
        assert_eq!(bytes[1], b'X');

        let decoded = BlockHeader::decode(&bytes)?;
        assert!(!decoded.is_allocated());
        assert_eq!(decoded.next_block_index, -1);
        Ok(())
    }

    #[test]
    fn rejects_bad_status_byte() {
        let mut bytes = [0u8; BLOCK_HEADER_BYTES];
        bytes[0] = b'?';
        assert!(BlockHeader::decode(&bytes).is_err());
    }
}
