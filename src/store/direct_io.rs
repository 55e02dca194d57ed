// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The direct-I/O backend (spec.md §4.1): the file is opened with
//! `O_DIRECT` (Linux) or `F_NOCACHE` (mac) and all I/O passes through a
//! page-keyed write-back cache of aligned buffers. Writes mark their page
//! dirty; `flush` sweeps the cache in ascending page order, coalescing
//! contiguous runs into a single `pwrite`.

#![allow(unsafe_code)]

use super::backend::PageSource;
use crate::config::{OpenMode, StoreConfig};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;

const PAGE_SIZE: usize = 4096;

/// A `posix_memalign`-backed page-sized buffer, required because `O_DIRECT`
/// I/O rejects unaligned user buffers on Linux.
struct AlignedPage {
    ptr: *mut u8,
}

// SAFETY: the pointer is exclusively owned by this struct and never shared
// across threads without going through the `Store`'s own synchronization
// (the core is single-threaded per spec.md §5).
unsafe impl Send for AlignedPage {}

impl AlignedPage {
    fn zeroed() -> Result<Self> {
        let mut ptr: *mut libc::c_void = std::ptr::null_mut();

        // SAFETY: `ptr` is a valid out-pointer and `PAGE_SIZE` is a power of two.
        let ret = unsafe { libc::posix_memalign(&mut ptr, PAGE_SIZE, PAGE_SIZE) };
        if ret != 0 || ptr.is_null() {
            return Err(Error::OutOfMemory);
        }

        // SAFETY: `ptr` points at `PAGE_SIZE` freshly allocated bytes.
        unsafe {
            std::ptr::write_bytes(ptr.cast::<u8>(), 0, PAGE_SIZE);
        }

        Ok(Self { ptr: ptr.cast::<u8>() })
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `PAGE_SIZE` bytes for the struct's lifetime.
        unsafe { std::slice::from_raw_parts(self.ptr, PAGE_SIZE) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `ptr` is valid for `PAGE_SIZE` bytes for the struct's lifetime,
        // and access is exclusive through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, PAGE_SIZE) }
    }
}

impl Drop for AlignedPage {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated by `posix_memalign` and is freed exactly once.
        unsafe {
            libc::free(self.ptr.cast::<libc::c_void>());
        }
    }
}

struct CachedPage {
    data: AlignedPage,
    dirty: bool,
}

/// Direct-I/O [`PageSource`] with an aligned page write-back cache.
pub struct DirectIoSource {
    file: File,
    len: u64,
    pages: RefCell<FxHashMap<u64, CachedPage>>,
}

impl DirectIoSource {
    fn ensure_loaded(&self, page_idx: u64) -> Result<()> {
        if self.pages.borrow().contains_key(&page_idx) {
            return Ok(());
        }

        let mut page = AlignedPage::zeroed()?;
        let file_offset = page_idx * PAGE_SIZE as u64;

        if file_offset < self.len {
            // Partial trailing pages read fewer bytes than PAGE_SIZE; the
            // remainder of the aligned buffer stays zeroed.
            let _ = self.file.read_at(page.as_mut_slice(), file_offset);
        }

        self.pages.borrow_mut().insert(page_idx, CachedPage { data: page, dirty: false });
        Ok(())
    }
}

impl PageSource for DirectIoSource {
    fn open(config: &StoreConfig) -> Result<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true);
        if config.mode == OpenMode::ReadWrite {
            opts.write(true).create(true);
        }

        #[cfg(target_os = "linux")]
        opts.custom_flags(libc::O_DIRECT);

        let file = opts.open(&config.path)?;

        #[cfg(target_os = "macos")]
        {
            // SAFETY: `file`'s raw fd is valid for the duration of this call.
            unsafe {
                libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1);
            }
        }

        let len = file.metadata()?.len();

        Ok(Self {
            file,
            len,
            pages: RefCell::new(FxHashMap::default()),
        })
    }

    fn total_bytes(&self) -> u64 {
        self.len
    }

    fn grow_to(&mut self, new_len: u64) -> Result<()> {
        if new_len <= self.len {
            return Ok(());
        }

        #[cfg(target_os = "linux")]
        {
            #[allow(clippy::cast_possible_wrap)]
            let ret = unsafe { libc::posix_fallocate(self.file.as_raw_fd(), 0, new_len as libc::off_t) };
            if ret != 0 {
                self.file.set_len(new_len)?;
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            self.file.set_len(new_len)?;
        }

        self.len = new_len;
        Ok(())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut remaining = buf;
        let mut pos = offset;

        while !remaining.is_empty() {
            let page_idx = pos / PAGE_SIZE as u64;
            let page_off = (pos % PAGE_SIZE as u64) as usize;
            let take = remaining.len().min(PAGE_SIZE - page_off);

            self.ensure_loaded(page_idx)?;
            let pages = self.pages.borrow();
            let page = pages.get(&page_idx).ok_or(Error::Corrupt("page vanished from direct-io cache"))?;
            remaining[..take].copy_from_slice(&page.data.as_slice()[page_off..page_off + take]);
            drop(pages);

            remaining = &mut remaining[take..];
            pos += take as u64;
        }

        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut remaining = buf;
        let mut pos = offset;

        while !remaining.is_empty() {
            let page_idx = pos / PAGE_SIZE as u64;
            let page_off = (pos % PAGE_SIZE as u64) as usize;
            let take = remaining.len().min(PAGE_SIZE - page_off);

            self.ensure_loaded(page_idx)?;
            let mut pages = self.pages.borrow_mut();
            let page = pages.get_mut(&page_idx).ok_or(Error::Corrupt("page vanished from direct-io cache"))?;
            page.data.as_mut_slice()[page_off..page_off + take].copy_from_slice(&remaining[..take]);
            page.dirty = true;
            drop(pages);

            remaining = &remaining[take..];
            pos += take as u64;
        }

        self.len = self.len.max(offset + buf.len() as u64);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let mut dirty: Vec<u64> = self
            .pages
            .borrow()
            .iter()
            .filter(|(_, page)| page.dirty)
            .map(|(&idx, _)| idx)
            .collect();
        dirty.sort_unstable();

        let mut i = 0;
        while i < dirty.len() {
            let mut run_end = i + 1;
            while run_end < dirty.len() && dirty[run_end] == dirty[run_end - 1] + 1 {
                run_end += 1;
            }

            let mut coalesced = Vec::with_capacity((run_end - i) * PAGE_SIZE);
            {
                let pages = self.pages.borrow();
                for idx in &dirty[i..run_end] {
                    let page = pages.get(idx).ok_or(Error::Corrupt("dirty page vanished from direct-io cache"))?;
                    coalesced.extend_from_slice(page.data.as_slice());
                }
            }

            let file_offset = dirty[i] * PAGE_SIZE as u64;
            self.file.write_at(&coalesced, file_offset)?;
            i = run_end;
        }

        let mut pages = self.pages.borrow_mut();
        for idx in &dirty {
            if let Some(page) = pages.get_mut(idx) {
                page.dirty = false;
            }
        }
        drop(pages);

        self.file.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use test_log::test;

    #[test]
    fn write_read_across_pages_and_flush() -> Result<()> {
        let dir = tempfile::tempdir().map_err(Error::Io)?;
        let path = dir.path().join("data.flint");
        let config = StoreConfig::new(&path).backend(Backend::DirectIo);

        let mut src = DirectIoSource::open(&config)?;
        src.grow_to(3 * PAGE_SIZE as u64)?;

        let offset = PAGE_SIZE as u64 - 4;
        let data = [9u8; 16];
        src.write(offset, &data)?;
        src.flush()?;

        let mut out = [0u8; 16];
        src.read(offset, &mut out)?;
        assert_eq!(out, data);
        Ok(())
    }
}
