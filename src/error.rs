// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::EncodeError;

/// Errors that can occur while operating the block store or the B+ tree index.
#[derive(Debug)]
pub enum Error {
    /// Backing store read/write/truncate/map failure; carries the OS error.
    Io(std::io::Error),

    /// Attempted to read or chase a chain through a block whose status is free.
    NotSet,

    /// Overflow chain is corrupt: length overflow, self-loop, inconsistent
    /// mark on a non-head follower, or stored length disagrees with the
    /// chain's actual payload.
    BadChain,

    /// Open-time mismatch between requested and stored block/increment size,
    /// or a negative/zero key was passed to the tree.
    BadArgument(&'static str),

    /// Tree-level invariant violation encountered during navigation, e.g. a
    /// separator offset of `0` or `-1`, or a duplicate/missing child.
    Corrupt(&'static str),

    /// Allocation failure for scratch buffers, cache entries, or node
    /// materializations.
    OutOfMemory,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::NotSet => write!(f, "block is not set (free)"),
            Self::BadChain => write!(f, "overflow chain is corrupt"),
            Self::BadArgument(msg) => write!(f, "bad argument: {msg}"),
            Self::Corrupt(msg) => write!(f, "tree invariant violated: {msg}"),
            Self::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        match value {
            EncodeError::Io(e) => Self::Io(e),
        }
    }
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;
