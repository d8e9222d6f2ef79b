use std::io;

use thiserror::Error;

/// An error returned when decompressing an uploaded profile.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decompressed payload exceeds the configured limit.
    #[error("decompressed size exceeds the limit of {0} bytes")]
    TooLarge(usize),
    /// The compressed stream is invalid.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// An error returned by a [`Parser`](crate::Parser).
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ParseError {
    #[error("invalid magic bytes at offset {offset}")]
    InvalidMagic { offset: usize },
    #[error("unsupported recording version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("truncated chunk header at offset {offset}")]
    TruncatedHeader { offset: usize },
    #[error("invalid chunk size {size} at offset {offset}")]
    InvalidChunkSize { offset: usize, size: u64 },
    #[error("chunk at offset {offset} points outside of its bounds")]
    InvalidChunkOffsets { offset: usize },
}
