// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The memory-mapped backend (spec.md §4.1): the file is opened shared and
//! mapped into the process; reads slice directly into the mapping and
//! writes mutate it in place. The mapping is replaced whenever the file
//! grows. A bounded, chunk-granular read cache sits in front of the mapping
//! (spec.md §2 dependency item 2, §5 "Eviction policy"), so repeatedly-read
//! chunks are served from a materialized copy instead of re-slicing the
//! mapping on every call; it is invalidated on any write that touches the
//! chunk.

#![allow(unsafe_code)]

use super::backend::PageSource;
use crate::buf::ByteBuf;
use crate::cache::OffsetCache;
use crate::config::{OpenMode, StoreConfig};
use crate::{Error, Result};
use quick_cache::Weighter;
use std::fs::{File, OpenOptions};

/// Smallest chunk size the read cache will use, even if `increment_bytes`
/// is configured smaller than this.
const MIN_CHUNK_BYTES: u64 = 4096;

/// Byte budget for the chunk read cache. Not a configuration surface
/// (spec.md §6.4 does not enumerate one for this); an internal default in
/// the same spirit as the tree's node cache floor.
const CHUNK_CACHE_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Clone, Copy)]
struct ChunkWeighter;

impl Weighter<u64, ByteBuf> for ChunkWeighter {
    fn weight(&self, _key: &u64, val: &ByteBuf) -> u64 {
        val.len() as u64
    }
}

enum Mapping {
    ReadOnly(memmap2::Mmap),
    ReadWrite(memmap2::MmapMut),
}

impl Mapping {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::ReadOnly(m) => m,
            Self::ReadWrite(m) => m,
        }
    }
}

/// Memory-mapped [`PageSource`]; the mapping is replaced whenever the file grows.
pub struct MmapSource {
    file: File,
    mapping: Option<Mapping>,
    len: u64,
    mode: OpenMode,
    chunk_bytes: u64,
    chunk_cache: OffsetCache<ByteBuf, ChunkWeighter>,
}

impl MmapSource {
    fn remap(&mut self) -> Result<()> {
        self.mapping = None;

        if self.len == 0 {
            return Ok(());
        }

        // SAFETY: the store owns this file handle exclusively for the
        // lifetime of the mapping; concurrent external mutation of the file
        // is explicitly out of scope (spec.md §9's open question on
        // cross-process growth).
        let mapping = if self.mode == OpenMode::ReadOnly {
            Mapping::ReadOnly(unsafe { memmap2::Mmap::map(&self.file)? })
        } else {
            Mapping::ReadWrite(unsafe { memmap2::MmapMut::map_mut(&self.file)? })
        };
        self.mapping = Some(mapping);
        Ok(())
    }

    fn mapping(&self) -> Result<&[u8]> {
        self.mapping
            .as_ref()
            .map(Mapping::as_slice)
            .ok_or(Error::Corrupt("mmap backend has no active mapping"))
    }

    fn mapping_mut(&mut self) -> Result<&mut [u8]> {
        match self.mapping.as_mut() {
            Some(Mapping::ReadWrite(m)) => Ok(&mut m[..]),
            Some(Mapping::ReadOnly(_)) => Err(Error::BadArgument("store was opened read-only")),
            None => Err(Error::Corrupt("mmap backend has no active mapping")),
        }
    }

    /// If `[offset, offset + len)` fits entirely inside one chunk, returns
    /// that chunk's index and the request's start position within it.
    fn single_chunk(&self, offset: u64, len: usize) -> Option<(u64, usize)> {
        if len == 0 || self.chunk_bytes == 0 {
            return None;
        }
        let chunk_idx = offset / self.chunk_bytes;
        let chunk_start = chunk_idx * self.chunk_bytes;
        let local_start = usize::try_from(offset - chunk_start).ok()?;
        let local_end = u64::try_from(local_start.checked_add(len)?).ok()?;
        (local_end <= self.chunk_bytes).then_some((chunk_idx, local_start))
    }
}

impl PageSource for MmapSource {
    fn open(config: &StoreConfig) -> Result<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true);
        if config.mode == OpenMode::ReadWrite {
            opts.write(true).create(true);
        }

        let file = opts.open(&config.path)?;
        let len = file.metadata()?.len();
        let chunk_bytes = u64::from(config.increment_bytes).max(MIN_CHUNK_BYTES);

        let mut source = Self {
            file,
            mapping: None,
            len,
            mode: config.mode,
            chunk_bytes,
            chunk_cache: OffsetCache::with_capacity_bytes(CHUNK_CACHE_BYTES, ChunkWeighter),
        };
        source.remap()?;
        Ok(source)
    }

    fn total_bytes(&self) -> u64 {
        self.len
    }

    fn grow_to(&mut self, new_len: u64) -> Result<()> {
        if new_len <= self.len {
            return Ok(());
        }

        self.file.set_len(new_len)?;
        self.len = new_len;
        self.remap()
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| Error::BadArgument("offset exceeds addressable range"))?;
        let end = start + buf.len();

        if let Some((chunk_idx, local_start)) = self.single_chunk(offset, buf.len()) {
            if let Some(chunk) = self.chunk_cache.get(chunk_idx) {
                buf.copy_from_slice(&chunk[local_start..local_start + buf.len()]);
                return Ok(());
            }

            let mapping = self.mapping()?;
            if end > mapping.len() {
                return Err(Error::Corrupt("mmap read out of bounds"));
            }

            let chunk_start = usize::try_from(chunk_idx * self.chunk_bytes).expect("chunk start fits in usize");
            let chunk_end = (chunk_start + self.chunk_bytes as usize).min(mapping.len());
            let chunk: ByteBuf = mapping[chunk_start..chunk_end].to_vec().into();
            buf.copy_from_slice(&chunk[local_start..local_start + buf.len()]);
            self.chunk_cache.insert(chunk_idx, chunk);
            return Ok(());
        }

        let mapping = self.mapping()?;
        if end > mapping.len() {
            return Err(Error::Corrupt("mmap read out of bounds"));
        }
        buf.copy_from_slice(&mapping[start..end]);
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| Error::BadArgument("offset exceeds addressable range"))?;
        let end = start + buf.len();
        let mapping = self.mapping_mut()?;
        if end > mapping.len() {
            return Err(Error::Corrupt("mmap write out of bounds"));
        }
        mapping[start..end].copy_from_slice(buf);

        if self.chunk_bytes > 0 && !buf.is_empty() {
            let first_chunk = offset / self.chunk_bytes;
            let last_chunk = (offset + buf.len() as u64 - 1) / self.chunk_bytes;
            for idx in first_chunk..=last_chunk {
                self.chunk_cache.invalidate(idx);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(Mapping::ReadWrite(mapping)) = &self.mapping {
            mapping.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.mapping = None;
        self.chunk_cache.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use test_log::test;

    #[test]
    fn grows_and_roundtrips() -> Result<()> {
        let dir = tempfile::tempdir().map_err(Error::Io)?;
        let config = StoreConfig::new(dir.path().join("data.flint")).backend(Backend::Mmap);

        let mut src = MmapSource::open(&config)?;
        src.grow_to(8192)?;
        src.write(100, b"hello world")?;

        let mut out = [0u8; 11];
        src.read(100, &mut out)?;
        assert_eq!(&out, b"hello world");
        Ok(())
    }

    #[test]
    fn read_only_mode_uses_immutable_mapping() -> Result<()> {
        let dir = tempfile::tempdir().map_err(Error::Io)?;
        let path = dir.path().join("data.flint");

        {
            let config = StoreConfig::new(&path).backend(Backend::Mmap);
            let mut src = MmapSource::open(&config)?;
            src.grow_to(4096)?;
            src.write(0, b"persisted")?;
        }

        let config = StoreConfig::new(&path).backend(Backend::Mmap).mode(OpenMode::ReadOnly);
        let src = MmapSource::open(&config)?;

        let mut out = [0u8; 9];
        src.read(0, &mut out)?;
        assert_eq!(&out, b"persisted");
        Ok(())
    }

    #[test]
    fn read_only_mode_rejects_writes() -> Result<()> {
        let dir = tempfile::tempdir().map_err(Error::Io)?;
        let path = dir.path().join("data.flint");

        {
            let config = StoreConfig::new(&path).backend(Backend::Mmap);
            let mut src = MmapSource::open(&config)?;
            src.grow_to(4096)?;
        }

        let config = StoreConfig::new(&path).backend(Backend::Mmap).mode(OpenMode::ReadOnly);
        let mut src = MmapSource::open(&config)?;
        assert!(src.write(0, b"nope").is_err());
        Ok(())
    }

    #[test]
    fn chunk_cache_serves_repeat_reads_and_drops_on_write() -> Result<()> {
        let dir = tempfile::tempdir().map_err(Error::Io)?;
        let config = StoreConfig::new(dir.path().join("data.flint"))
            .backend(Backend::Mmap)
            .increment_bytes(4096);

        let mut src = MmapSource::open(&config)?;
        src.grow_to(8192)?;
        src.write(10, b"first")?;

        let mut out = [0u8; 5];
        src.read(10, &mut out)?;
        assert_eq!(&out, b"first");
        assert!(src.chunk_cache.get(0).is_some());

        src.write(10, b"seco2")?;
        let mut out = [0u8; 5];
        src.read(10, &mut out)?;
        assert_eq!(&out, b"seco2");
        Ok(())
    }
}
