// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Raw file helpers sitting below the block store: positional reads and an
//! atomic rewrite-then-rename used to commit header state on backends that
//! cannot mutate a file region in place.

use crate::{buf::ByteBuf, fs::FileSystem};
use std::{fs::File, io::Write, path::Path};

#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Magic bytes stamped at the start of the tree's extra header region once a
/// root has been persisted.
pub const MAGIC_BYTES: [u8; 4] = *b"B+T1";

/// Reads exactly `size` bytes from `file` at `offset` using `pread`.
pub fn read_exact(file: &File, offset: u64, size: usize) -> std::io::Result<ByteBuf> {
    let mut buf = vec![0u8; size];

    #[cfg(unix)]
    let bytes_read = file.read_at(&mut buf, offset)?;

    #[cfg(not(unix))]
    let bytes_read = {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = file.try_clone()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read(&mut buf)?
    };

    if bytes_read != size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "read_exact({bytes_read}) at {offset} did not read enough bytes {size}; file has length {}",
                file.metadata()?.len(),
            ),
        ));
    }

    Ok(buf.into())
}

/// Atomically rewrites a file: write to a sibling temp file, fsync, then
/// rename over the original. Used to commit the block store's file header
/// on backends that cannot mutate it in place.
pub fn rewrite_atomic<F: FileSystem>(path: &Path, content: &[u8]) -> std::io::Result<()> {
    #[expect(
        clippy::expect_used,
        reason = "every file should have a parent directory"
    )]
    let folder = path.parent().expect("should have a parent");

    let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file_mut().sync_all()?;
    temp_file.persist(path)?;

    #[cfg(not(target_os = "windows"))]
    {
        let file = F::open(path)?;
        file.sync_all()?;

        #[expect(
            clippy::expect_used,
            reason = "files should always have a parent directory"
        )]
        let folder = path.parent().expect("should have parent folder");
        fsync_directory::<F>(folder)?;
    }

    Ok(())
}

/// Fsyncs a directory so a prior rename into it is durable.
#[cfg(not(target_os = "windows"))]
pub fn fsync_directory<F: FileSystem>(path: &Path) -> std::io::Result<()> {
    let file = F::open(path)?;
    debug_assert!(file.metadata()?.is_dir());
    file.sync_all()
}

/// Fsyncs a directory so a prior rename into it is durable.
#[cfg(target_os = "windows")]
pub fn fsync_directory<F: FileSystem>(_path: &Path) -> std::io::Result<()> {
    // Cannot fsync directory on Windows
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use std::io::Write;
    use test_log::test;

    #[test]
    fn atomic_rewrite() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let path = dir.path().join("test.txt");
        {
            let mut file = <crate::fs::StdFileSystem as FileSystem>::create(&path)?;
            write!(file, "asdasdasdasdasd")?;
        }

        rewrite_atomic::<crate::fs::StdFileSystem>(&path, b"newcontent")?;

        let content = crate::fs::StdFileSystem::read_to_string(&path)?;
        assert_eq!("newcontent", content);

        Ok(())
    }

    #[test]
    fn read_exact_roundtrip() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("blob.bin");

        {
            let mut file = <crate::fs::StdFileSystem as FileSystem>::create(&path)?;
            file.write_all(&[0xAAu8; 64])?;
        }

        let file = <crate::fs::StdFileSystem as FileSystem>::open(&path)?;
        let buf = read_exact(&file, 10, 20)?;
        assert_eq!(&*buf, &[0xAAu8; 20][..]);

        assert!(read_exact(&file, 60, 20).is_err());

        Ok(())
    }
}
