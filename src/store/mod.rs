// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The block storage engine (spec.md §4.1): a self-describing, free-listed,
//! block-oriented file with three interchangeable backends.
//!
//! [`Store<P>`] implements the allocation, free-list, overflow-chaining and
//! header-commit logic exactly once, generic over a [`PageSource`]; the
//! three backends only ever need to move bytes and grow the file. Runtime
//! backend selection happens one layer up, in [`AnyBlockStore`], so the
//! B+ tree (generic over [`BlockStore`]) never needs dynamic dispatch.

pub mod backend;
pub mod block;
pub mod header;
pub mod memory;

#[cfg(feature = "mmap")]
pub mod mmap;

#[cfg(all(feature = "direct-io", unix))]
pub mod direct_io;

pub use backend::PageSource;
pub use block::{BlockHeader, Mark, Status, BLOCK_HEADER_BYTES};
pub use header::{CommonTrailer, CURRENT_VERSION, EXTRA_HEADER_BYTES, HEADER_BYTES};
pub use memory::MemorySource;

#[cfg(feature = "mmap")]
pub use mmap::MmapSource;

#[cfg(all(feature = "direct-io", unix))]
pub use direct_io::DirectIoSource;

use crate::buf::ByteBuf;
use crate::config::{Backend, StoreConfig};
use crate::{Error, Result};
use header::{COMMON_TRAILER_BYTES, TRAILER_OFFSET};

/// Extra chain-walk steps tolerated beyond `ceil(total / block_data_bytes)`
/// before a chain is declared corrupt (spec.md §8, property 7).
const CHAIN_SLACK: usize = 8;

/// Header fields are flushed to the backend on every Nth write so
/// steady-state workloads do not thrash the header page (spec.md §4.1,
/// "Header commit policy").
const HEADER_COMMIT_INTERVAL: u32 = 64;

/// An OS page size assumption used only to align chunk growth; no backend
/// here depends on this being exactly correct, only divisible-into.
const ASSUMED_PAGE_SIZE: u64 = 4096;

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Smallest growth unit that is a multiple of both `block_bytes` and
/// `page_size`, sized to cover at least `increment_bytes` (spec.md §4.1,
/// "Growth and allocation").
fn chunk_bytes_for(block_bytes: u64, increment_bytes: u32, page_size: u64) -> u64 {
    let unit = block_bytes / gcd(block_bytes, page_size) * page_size;
    let increment = u64::from(increment_bytes);
    increment.div_ceil(unit).max(1) * unit
}

/// The public capability every block store backend combination exposes.
/// The B+ tree is generic over this trait, never over a concrete backend.
pub trait BlockStore {
    /// Reads the record whose head block is `index`, reassembling it from
    /// its overflow chain.
    fn read(&self, index: i64) -> Result<ByteBuf>;

    /// Writes a new record, returning its head block index.
    fn write(&mut self, buf: &[u8]) -> Result<i64>;

    /// Overwrites the record at `index` in place.
    fn write_at(&mut self, index: i64, buf: &[u8]) -> Result<()>;

    /// Deletes the record at `index`, returning `1` if it was allocated or
    /// `0` if it was already free.
    fn delete(&mut self, index: i64) -> Result<u32>;

    /// Reads `length` bytes at `offset` within the caller-owned extra
    /// header region (used by the tree to store its root pointer).
    fn head(&self, offset: u64, length: usize) -> Result<ByteBuf>;

    /// Writes `data` at `offset` within the extra header region.
    fn write_head(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Total file size in bytes.
    fn bytes(&self) -> u64;

    /// Number of allocated head blocks (logical records).
    fn count(&self) -> u64;

    /// The user block payload size this store was opened with.
    fn block_data_bytes(&self) -> i16;

    /// Forces the in-RAM header state and any buffered writes to durable
    /// storage without closing the backend.
    fn flush(&mut self) -> Result<()>;

    /// Flushes and releases the backend. Must be called before program exit
    /// to commit the header and, on the direct-I/O backend, the page cache.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// A generic block store over any [`PageSource`]. Implements the Block
/// Store contract (spec.md §4.1) exactly once.
pub struct Store<P: PageSource> {
    source: P,
    block_data_bytes: i16,
    increment_bytes: u32,
    block_bytes: u64,
    chunk_bytes: u64,
    free_list_head: i64,
    count: i64,
    dirty_writes: u32,
    closed: bool,
}

impl<P: PageSource> Store<P> {
    /// Opens (or creates) a block store backed by `P`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let mut source = P::open(&config)?;
        let block_bytes = BLOCK_HEADER_BYTES as u64 + config.block_data_bytes as u64;
        let fresh = source.total_bytes() < HEADER_BYTES;

        let (block_data_bytes, increment_bytes, free_list_head, count) = if fresh {
            source.grow_to(HEADER_BYTES)?;

            let trailer = CommonTrailer::fresh(config.block_data_bytes, config.increment_bytes);
            let mut bytes = [0u8; COMMON_TRAILER_BYTES];
            trailer.encode(&mut bytes)?;
            source.write(TRAILER_OFFSET as u64, &bytes)?;

            (
                config.block_data_bytes,
                config.increment_bytes,
                trailer.free_list_head,
                trailer.count,
            )
        } else {
            let mut bytes = [0u8; COMMON_TRAILER_BYTES];
            source.read(TRAILER_OFFSET as u64, &mut bytes)?;
            let trailer = CommonTrailer::decode(&bytes)?;

            if trailer.block_data_bytes != config.block_data_bytes {
                return Err(Error::BadArgument(
                    "block_data_bytes does not match the value stored in the file header",
                ));
            }

            (
                trailer.block_data_bytes,
                trailer.increment_bytes,
                trailer.free_list_head,
                trailer.count,
            )
        };

        let chunk_bytes = chunk_bytes_for(block_bytes, increment_bytes, ASSUMED_PAGE_SIZE);

        Ok(Self {
            source,
            block_data_bytes,
            increment_bytes,
            block_bytes,
            chunk_bytes,
            free_list_head,
            count,
            dirty_writes: 0,
            closed: false,
        })
    }

    fn block_offset(&self, index: u64) -> u64 {
        HEADER_BYTES + index * self.block_bytes
    }

    fn region_block_count(&self) -> u64 {
        (self.source.total_bytes() - HEADER_BYTES) / self.block_bytes
    }

    fn read_header(&self, index: u64) -> Result<BlockHeader> {
        let mut bytes = [0u8; BLOCK_HEADER_BYTES];
        self.source.read(self.block_offset(index), &mut bytes)?;
        BlockHeader::decode(&bytes)
    }

    fn write_header(&mut self, index: u64, header: &BlockHeader) -> Result<()> {
        let mut bytes = [0u8; BLOCK_HEADER_BYTES];
        header.encode(&mut bytes)?;
        self.source.write(self.block_offset(index), &bytes)
    }

    fn write_block(&mut self, index: u64, header: &BlockHeader, payload: &[u8]) -> Result<()> {
        let mut bytes = vec![0u8; BLOCK_HEADER_BYTES + payload.len()];
        header.encode((&mut bytes[..BLOCK_HEADER_BYTES]).try_into().expect("header-sized slice"))?;
        bytes[BLOCK_HEADER_BYTES..].copy_from_slice(payload);
        self.source.write(self.block_offset(index), &bytes)
    }

    /// Extends the backing storage so that block `min_index` is addressable,
    /// stamping every newly created block as free with a linear next-pointer
    /// chain (spec.md §4.1, "Growth and allocation").
    fn inflate(&mut self, min_index: u64) -> Result<()> {
        let required_end = HEADER_BYTES + (min_index + 1) * self.block_bytes;
        if required_end <= self.source.total_bytes() {
            return Ok(());
        }

        let first_new_index = self.region_block_count();
        let mut region_len = self.source.total_bytes() - HEADER_BYTES;
        while HEADER_BYTES + region_len < required_end {
            region_len += self.chunk_bytes;
        }
        let new_total = HEADER_BYTES + region_len;
        self.source.grow_to(new_total)?;

        let last_new_index = region_len / self.block_bytes - 1;

        for idx in first_new_index..=last_new_index {
            let next = if idx == last_new_index {
                self.free_list_head
            } else {
                #[allow(clippy::cast_possible_wrap)]
                let next = (idx + 1) as i64;
                next
            };
            let header = BlockHeader::free_with_next(next);
            self.write_header(idx, &header)?;
        }

        #[allow(clippy::cast_possible_wrap)]
        let head = first_new_index as i64;
        self.free_list_head = head;
        Ok(())
    }

    fn pop_free(&mut self) -> Result<u64> {
        if self.free_list_head == -1 {
            self.inflate(self.region_block_count())?;
        }

        #[allow(clippy::cast_sign_loss)]
        let idx = self.free_list_head as u64;
        let header = self.read_header(idx)?;

        if header.is_allocated() {
            return Err(Error::BadChain);
        }
        if header.next_block_index == self.free_list_head {
            return Err(Error::BadChain);
        }

        self.free_list_head = header.next_block_index;
        Ok(idx)
    }

    fn push_free(&mut self, index: u64) -> Result<()> {
        let header = BlockHeader::free_with_next(self.free_list_head);
        self.write_header(index, &header)?;
        #[allow(clippy::cast_possible_wrap)]
        let idx = index as i64;
        self.free_list_head = idx;
        Ok(())
    }

    /// Detaches a currently-free block from the free list so it can be
    /// reused directly by `write_at` ("belong to the virgin tail", spec.md
    /// §4.1's `write_at` contract).
    fn detach_free(&mut self, index: u64) -> Result<()> {
        #[allow(clippy::cast_possible_wrap)]
        let target = index as i64;

        if self.free_list_head == target {
            let header = self.read_header(index)?;
            self.free_list_head = header.next_block_index;
            return Ok(());
        }

        let mut cur = self.free_list_head;
        let mut steps = 0usize;
        while cur != -1 {
            #[allow(clippy::cast_sign_loss)]
            let cur_idx = cur as u64;
            let header = self.read_header(cur_idx)?;

            if header.next_block_index == target {
                let mut updated = header;
                let target_header = self.read_header(index)?;
                updated.next_block_index = target_header.next_block_index;
                self.write_header(cur_idx, &updated)?;
                return Ok(());
            }

            cur = header.next_block_index;
            steps += 1;
            if steps > self.region_block_count() as usize + CHAIN_SLACK {
                return Err(Error::BadChain);
            }
        }

        Err(Error::BadArgument("block index is not on the free list"))
    }

    /// Walks the overflow chain starting at `head_idx`, returning each
    /// block's index and decoded header in chain order.
    fn chain_indices(&self, head_idx: u64) -> Result<Vec<(u64, BlockHeader)>> {
        let head_header = self.read_header(head_idx)?;
        if !head_header.is_allocated() || head_header.mark != Mark::Data {
            return Err(Error::BadChain);
        }

        #[allow(clippy::cast_sign_loss)]
        let total_len = head_header.total_length as usize;
        let max_steps = total_len.div_ceil((self.block_data_bytes.max(1)) as usize) + CHAIN_SLACK;

        let mut chain = vec![(head_idx, head_header)];
        let mut current_idx = head_idx;
        let mut current_header = head_header;
        let mut steps = 0usize;

        loop {
            let next = current_header.next_block_index;
            if next == -1 {
                break;
            }
            #[allow(clippy::cast_sign_loss)]
            if next == current_idx as i64 {
                return Err(Error::BadChain);
            }

            steps += 1;
            if steps > max_steps {
                return Err(Error::BadChain);
            }

            #[allow(clippy::cast_sign_loss)]
            let next_idx = next as u64;
            let next_header = self.read_header(next_idx)?;
            if !next_header.is_allocated() || next_header.mark != Mark::Next {
                return Err(Error::BadChain);
            }

            chain.push((next_idx, next_header));
            current_idx = next_idx;
            current_header = next_header;
        }

        Ok(chain)
    }

    fn allocate_chain(&mut self, buf: &[u8]) -> Result<u64> {
        let block_data_bytes = self.block_data_bytes as usize;
        let n_blocks = buf.len().div_ceil(block_data_bytes).max(1);

        let mut indices = Vec::with_capacity(n_blocks);
        for _ in 0..n_blocks {
            indices.push(self.pop_free()?);
        }

        self.write_chain(&indices, buf)?;
        Ok(indices[0])
    }

    fn write_chain(&mut self, indices: &[u64], buf: &[u8]) -> Result<()> {
        let block_data_bytes = self.block_data_bytes as usize;

        for (i, &idx) in indices.iter().enumerate() {
            let start = i * block_data_bytes;
            let end = (start + block_data_bytes).min(buf.len());
            let chunk = &buf[start..end];

            let mark = if i == 0 { Mark::Data } else { Mark::Next };
            #[allow(clippy::cast_possible_wrap)]
            let next_block_index = if i + 1 < indices.len() { indices[i + 1] as i64 } else { -1 };

            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
            let header = BlockHeader {
                status: Status::Allocated,
                mark,
                chunk_length: chunk.len() as i16,
                total_length: if i == 0 { buf.len() as i32 } else { 0 },
                next_block_index,
            };

            self.write_block(idx, &header, chunk)?;
        }

        Ok(())
    }

    fn touch_dirty(&mut self) -> Result<()> {
        self.dirty_writes += 1;
        if self.dirty_writes >= HEADER_COMMIT_INTERVAL {
            self.commit_header()?;
        }
        Ok(())
    }

    fn commit_header(&mut self) -> Result<()> {
        let trailer = CommonTrailer {
            free_list_head: self.free_list_head,
            version: CURRENT_VERSION,
            increment_bytes: self.increment_bytes,
            block_data_bytes: self.block_data_bytes,
            count: self.count,
        };
        let mut bytes = [0u8; COMMON_TRAILER_BYTES];
        trailer.encode(&mut bytes)?;
        self.source.write(TRAILER_OFFSET as u64, &bytes)?;
        self.dirty_writes = 0;
        Ok(())
    }
}

impl<P: PageSource> BlockStore for Store<P> {
    fn read(&self, index: i64) -> Result<ByteBuf> {
        if index < 0 {
            return Err(Error::BadArgument("block index must be non-negative"));
        }
        #[allow(clippy::cast_sign_loss)]
        let head_idx = index as u64;

        let head_header = self.read_header(head_idx)?;
        if !head_header.is_allocated() {
            return Err(Error::NotSet);
        }

        let chain = self.chain_indices(head_idx)?;
        #[allow(clippy::cast_sign_loss)]
        let total_len = head_header.total_length as usize;
        let mut out = vec![0u8; total_len];
        let mut written = 0usize;

        for (idx, header) in chain {
            let chunk_len = header.chunk_length as usize;
            if written + chunk_len > total_len {
                return Err(Error::BadChain);
            }
            let payload_offset = self.block_offset(idx) + BLOCK_HEADER_BYTES as u64;
            self.source.read(payload_offset, &mut out[written..written + chunk_len])?;
            written += chunk_len;
        }

        if written != total_len {
            return Err(Error::BadChain);
        }

        Ok(out.into())
    }

    fn write(&mut self, buf: &[u8]) -> Result<i64> {
        let head = self.allocate_chain(buf)?;
        self.count += 1;
        self.touch_dirty()?;
        #[allow(clippy::cast_possible_wrap)]
        Ok(head as i64)
    }

    fn write_at(&mut self, index: i64, buf: &[u8]) -> Result<()> {
        if index < 0 {
            return Err(Error::BadArgument("block index must be non-negative"));
        }
        #[allow(clippy::cast_sign_loss)]
        let idx = index as u64;

        let header = self.read_header(idx)?;
        let existing: Vec<u64> = if header.is_allocated() {
            if header.mark != Mark::Data {
                return Err(Error::BadChain);
            }
            self.chain_indices(idx)?.into_iter().map(|(i, _)| i).collect()
        } else {
            self.detach_free(idx)?;
            vec![idx]
        };

        let block_data_bytes = self.block_data_bytes as usize;
        let n_needed = buf.len().div_ceil(block_data_bytes).max(1);

        let mut indices = Vec::with_capacity(n_needed);
        for i in 0..n_needed {
            if i < existing.len() {
                indices.push(existing[i]);
            } else {
                indices.push(self.pop_free()?);
            }
        }

        for &surplus in existing.iter().skip(n_needed) {
            self.push_free(surplus)?;
        }

        self.write_chain(&indices, buf)?;
        self.touch_dirty()?;
        Ok(())
    }

    fn delete(&mut self, index: i64) -> Result<u32> {
        if index < 0 {
            return Err(Error::BadArgument("block index must be non-negative"));
        }
        #[allow(clippy::cast_sign_loss)]
        let idx = index as u64;

        let header = self.read_header(idx)?;
        if !header.is_allocated() {
            return Ok(0);
        }
        if header.mark != Mark::Data {
            return Err(Error::BadChain);
        }

        let chain = self.chain_indices(idx)?;
        for (block_idx, _) in chain {
            self.push_free(block_idx)?;
        }

        self.count -= 1;
        self.touch_dirty()?;
        Ok(1)
    }

    fn head(&self, offset: u64, length: usize) -> Result<ByteBuf> {
        if offset + length as u64 > EXTRA_HEADER_BYTES as u64 {
            return Err(Error::BadArgument("head access out of extra header bounds"));
        }
        let mut buf = vec![0u8; length];
        self.source.read(offset, &mut buf)?;
        Ok(buf.into())
    }

    fn write_head(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if offset + data.len() as u64 > EXTRA_HEADER_BYTES as u64 {
            return Err(Error::BadArgument("head access out of extra header bounds"));
        }
        self.source.write(offset, data)
    }

    fn bytes(&self) -> u64 {
        self.source.total_bytes()
    }

    fn count(&self) -> u64 {
        #[allow(clippy::cast_sign_loss)]
        let count = self.count as u64;
        count
    }

    fn block_data_bytes(&self) -> i16 {
        self.block_data_bytes
    }

    fn flush(&mut self) -> Result<()> {
        self.commit_header()?;
        self.source.flush()
    }

    fn close(mut self) -> Result<()> {
        self.commit_header()?;
        self.source.close()?;
        self.closed = true;
        Ok(())
    }
}

impl<P: PageSource> Drop for Store<P> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.commit_header() {
            log::warn!("failed to flush block store header on drop: {e}");
            return;
        }
        if let Err(e) = self.source.close() {
            log::warn!("failed to close block store backend on drop: {e}");
        }
    }
}

/// A block store with its backend chosen at runtime. The tree only ever
/// needs this enum at the outermost open() call; everywhere else it is
/// generic over [`BlockStore`].
pub enum AnyBlockStore {
    /// Memory-mapped backend.
    #[cfg(feature = "mmap")]
    Mmap(Store<MmapSource>),
    /// Direct-I/O backend.
    #[cfg(all(feature = "direct-io", unix))]
    DirectIo(Store<DirectIoSource>),
    /// In-memory, non-durable backend.
    Memory(Store<MemorySource>),
}

/// Opens a block store using the backend named in `config`.
pub fn open(config: StoreConfig) -> Result<AnyBlockStore> {
    match config.backend {
        #[cfg(feature = "mmap")]
        Backend::Mmap => Ok(AnyBlockStore::Mmap(Store::open(config)?)),
        #[cfg(not(feature = "mmap"))]
        Backend::Mmap => Err(Error::BadArgument(
            "mmap backend is not available in this build",
        )),
        #[cfg(all(feature = "direct-io", unix))]
        Backend::DirectIo => Ok(AnyBlockStore::DirectIo(Store::open(config)?)),
        #[cfg(not(all(feature = "direct-io", unix)))]
        Backend::DirectIo => Err(Error::BadArgument(
            "direct-io backend is not available on this platform/build",
        )),
        Backend::Memory => Ok(AnyBlockStore::Memory(Store::open(config)?)),
    }
}

impl BlockStore for AnyBlockStore {
    fn read(&self, index: i64) -> Result<ByteBuf> {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.read(index),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.read(index),
            Self::Memory(s) => s.read(index),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<i64> {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.write(buf),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.write(buf),
            Self::Memory(s) => s.write(buf),
        }
    }

    fn write_at(&mut self, index: i64, buf: &[u8]) -> Result<()> {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.write_at(index, buf),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.write_at(index, buf),
            Self::Memory(s) => s.write_at(index, buf),
        }
    }

    fn delete(&mut self, index: i64) -> Result<u32> {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.delete(index),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.delete(index),
            Self::Memory(s) => s.delete(index),
        }
    }

    fn head(&self, offset: u64, length: usize) -> Result<ByteBuf> {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.head(offset, length),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.head(offset, length),
            Self::Memory(s) => s.head(offset, length),
        }
    }

    fn write_head(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.write_head(offset, data),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.write_head(offset, data),
            Self::Memory(s) => s.write_head(offset, data),
        }
    }

    fn bytes(&self) -> u64 {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.bytes(),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.bytes(),
            Self::Memory(s) => s.bytes(),
        }
    }

    fn count(&self) -> u64 {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.count(),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.count(),
            Self::Memory(s) => s.count(),
        }
    }

    fn block_data_bytes(&self) -> i16 {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.block_data_bytes(),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.block_data_bytes(),
            Self::Memory(s) => s.block_data_bytes(),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.flush(),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.flush(),
            Self::Memory(s) => s.flush(),
        }
    }

    fn close(self) -> Result<()> {
        match self {
            #[cfg(feature = "mmap")]
            Self::Mmap(s) => s.close(),
            #[cfg(all(feature = "direct-io", unix))]
            Self::DirectIo(s) => s.close(),
            Self::Memory(s) => s.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Backend, OpenMode};
    use test_log::test;

    fn memory_config() -> StoreConfig {
        StoreConfig::new("unused-for-memory-backend")
            .backend(Backend::Memory)
            .block_data_bytes(128)
            .increment_bytes(4096)
    }

    #[test]
    fn s1_growth_and_recovery() -> Result<()> {
        let mut store: Store<MemorySource> = Store::open(memory_config())?;

        let a = store.write(&[0x41; 10])?;
        assert_eq!(a, 0);
        let b = store.write(&[0x42; 10])?;
        assert_eq!(b, 1);

        assert_eq!(&*store.read(a)?, &[0x41; 10][..]);
        assert_eq!(&*store.read(b)?, &[0x42; 10][..]);
        assert_eq!(store.count(), 2);
        Ok(())
    }

    #[test]
    fn s2_overflow_chain_and_reuse() -> Result<()> {
        let mut store: Store<MemorySource> = Store::open(
            StoreConfig::new("unused")
                .backend(Backend::Memory)
                .block_data_bytes(4080)
                .increment_bytes(4080 * 32),
        )?;

        let head = store.write(&[0xCCu8; 10_000])?;
        assert_eq!(head, 0);

        let record = store.read(head)?;
        assert_eq!(record.len(), 10_000);
        assert!(record.iter().all(|&b| b == 0xCC));

        assert_eq!(store.delete(head)?, 1);

        let reused = store.write(&[0x00; 10])?;
        assert_eq!(reused, 0);
        assert_eq!(store.count(), 1);
        Ok(())
    }

    #[test]
    fn write_at_shrinks_and_frees_tail() -> Result<()> {
        let mut store: Store<MemorySource> = Store::open(memory_config())?;

        let head = store.write(&[1u8; 500])?;
        let before_region = store.region_block_count();

        store.write_at(head, &[2u8; 10])?;
        assert_eq!(&*store.read(head)?, &[2u8; 10][..]);

        // Freed tail blocks are reusable by a subsequent write.
        let reused = store.write(&[3u8; 500])?;
        assert!(reused != head);
        assert!(store.region_block_count() <= before_region.max(reused + 1));
        Ok(())
    }

    #[test]
    fn delete_already_free_is_noop() -> Result<()> {
        let mut store: Store<MemorySource> = Store::open(memory_config())?;
        let head = store.write(&[1u8; 4])?;
        assert_eq!(store.delete(head)?, 1);
        assert_eq!(store.delete(head)?, 0);
        Ok(())
    }

    #[test]
    fn read_of_free_block_is_not_set() -> Result<()> {
        let mut store: Store<MemorySource> = Store::open(memory_config())?;
        let head = store.write(&[1u8; 4])?;
        store.delete(head)?;
        assert!(matches!(store.read(head), Err(Error::NotSet)));
        Ok(())
    }

    #[test]
    fn head_region_roundtrip() -> Result<()> {
        let mut store: Store<MemorySource> = Store::open(memory_config())?;
        store.write_head(0, b"B+T1")?;
        store.write_head(12, &(-1i64).to_le_bytes())?;

        assert_eq!(&*store.head(0, 4)?, b"B+T1");
        assert_eq!(store.head(12, 8)?.to_vec(), (-1i64).to_le_bytes().to_vec());
        Ok(())
    }

    #[test]
    #[cfg(feature = "mmap")]
    fn close_then_reopen_preserves_state() -> Result<()> {
        let dir = tempfile::tempdir().map_err(Error::Io)?;
        let config = || {
            StoreConfig::new(dir.path().join("s8.flint"))
                .backend(Backend::Mmap)
                .block_data_bytes(128)
                .increment_bytes(4096)
        };

        let mut store: Store<MmapSource> = Store::open(config())?;
        let a = store.write(&[7u8; 20])?;
        store.close()?;

        let store: Store<MmapSource> = Store::open(config().mode(OpenMode::ReadWrite))?;
        assert_eq!(&*store.read(a)?, &[7u8; 20][..]);
        assert_eq!(store.count(), 1);
        Ok(())
    }
}
