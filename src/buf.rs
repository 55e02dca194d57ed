// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The byte buffer primitives everything else in the crate is built from:
//! an owned, cheaply-cloneable byte buffer ([`ByteBuf`]) for values that
//! travel out of the store, and a bounded little-endian accessor
//! ([`PageView`]) over either a heap `Vec<u8>` or a memory-mapped region, for
//! decoding block and node headers in place.

use std::sync::Arc;

/// An immutable byte buffer that can be cloned without an additional heap
/// allocation. Used as the return type of [`crate::store::BlockStore::read`]
/// and as the payload type handed to `write`/`write_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteBuf(Arc<[u8]>);

impl ByteBuf {
    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies the contents into an owned `Vec<u8>`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::ops::Deref for ByteBuf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for ByteBuf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ByteBuf {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into())
    }
}

impl From<&[u8]> for ByteBuf {
    fn from(value: &[u8]) -> Self {
        Self(value.into())
    }
}

impl From<ByteBuf> for Vec<u8> {
    fn from(value: ByteBuf) -> Self {
        value.to_vec()
    }
}

/// A bounded little-endian cursor over a mutable byte window.
///
/// The same accessor works whether `data` points into a heap `Vec<u8>` or a
/// memory-mapped chunk - both reduce to `&mut [u8]` - which is what lets the
/// block store's three backends share one codec for headers and node
/// payloads.
pub struct PageView<'a> {
    data: &'a mut [u8],
    pos: usize,
}

impl<'a> PageView<'a> {
    /// Wraps `data`, positioned at offset `0`.
    #[must_use]
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Total length of the underlying window.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.data.len()
    }

    /// Current cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Moves the cursor to an absolute position.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn bounds_check(&self, len: usize) -> crate::Result<()> {
        if self.pos + len > self.data.len() {
            return Err(crate::Error::Corrupt("page view access out of bounds"));
        }
        Ok(())
    }

    /// Reads one byte and advances the cursor.
    pub fn get_u8(&mut self) -> crate::Result<u8> {
        self.bounds_check(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    /// Writes one byte and advances the cursor.
    pub fn put_u8(&mut self, v: u8) -> crate::Result<()> {
        self.bounds_check(1)?;
        self.data[self.pos] = v;
        self.pos += 1;
        Ok(())
    }

    /// Reads a little-endian `i16` and advances the cursor.
    pub fn get_i16le(&mut self) -> crate::Result<i16> {
        self.bounds_check(2)?;
        let v = i16::from_le_bytes(self.data[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }

    /// Writes a little-endian `i16` and advances the cursor.
    pub fn put_i16le(&mut self, v: i16) -> crate::Result<()> {
        self.bounds_check(2)?;
        self.data[self.pos..self.pos + 2].copy_from_slice(&v.to_le_bytes());
        self.pos += 2;
        Ok(())
    }

    /// Reads a little-endian `i32` and advances the cursor.
    pub fn get_i32le(&mut self) -> crate::Result<i32> {
        self.bounds_check(4)?;
        let v = i32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    /// Writes a little-endian `i32` and advances the cursor.
    pub fn put_i32le(&mut self, v: i32) -> crate::Result<()> {
        self.bounds_check(4)?;
        self.data[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
        Ok(())
    }

    /// Reads a little-endian `i64` and advances the cursor.
    pub fn get_i64le(&mut self) -> crate::Result<i64> {
        self.bounds_check(8)?;
        let v = i64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    /// Writes a little-endian `i64` and advances the cursor.
    pub fn put_i64le(&mut self, v: i64) -> crate::Result<()> {
        self.bounds_check(8)?;
        self.data[self.pos..self.pos + 8].copy_from_slice(&v.to_le_bytes());
        self.pos += 8;
        Ok(())
    }

    /// Reads `len` raw bytes and advances the cursor.
    pub fn get_bytes(&mut self, len: usize) -> crate::Result<&[u8]> {
        self.bounds_check(len)?;
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Writes raw bytes and advances the cursor.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> crate::Result<()> {
        self.bounds_check(bytes.len())?;
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// The full underlying window, ignoring the cursor.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.data
    }

    /// The full underlying window, mutably, ignoring the cursor.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn page_view_roundtrip() -> crate::Result<()> {
        let mut buf = vec![0u8; 32];
        let mut view = PageView::new(&mut buf);
        view.put_u8(b'+')?;
        view.put_i16le(1234)?;
        view.put_i64le(-1)?;

        view.seek(0);
        assert_eq!(view.get_u8()?, b'+');
        assert_eq!(view.get_i16le()?, 1234);
        assert_eq!(view.get_i64le()?, -1);
        Ok(())
    }

    #[test]
    fn page_view_bounds() {
        let mut buf = vec![0u8; 2];
        let mut view = PageView::new(&mut buf);
        assert!(view.get_i64le().is_err());
    }

    #[test]
    fn byte_buf_cheap_clone() {
        let buf = ByteBuf::from(vec![1, 2, 3]);
        let clone = buf.clone();
        assert_eq!(&*buf, &*clone);
    }
}
