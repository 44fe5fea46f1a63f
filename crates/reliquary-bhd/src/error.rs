//! Error types for the archive crate.

use std::io;

use thiserror::Error;

/// Errors that can occur when decrypting or reading archive indices.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key material could not be parsed as an RSA public key.
    #[error("invalid archive key: {0}")]
    InvalidKey(String),

    /// The ciphertext ended in the middle of a block.
    #[error("truncated cipher block: expected {expected} bytes, got {actual}")]
    TruncatedBlock { expected: usize, actual: usize },

    /// A cipher block is not smaller than the key modulus.
    #[error("cipher block {index} is out of range for the key modulus")]
    BlockOutOfRange { index: usize },

    /// A decrypted block does not fit the output block size.
    #[error("decrypted block {index} is {len} bytes, larger than the {max}-byte output block")]
    BlockOverflow { index: usize, len: usize, max: usize },

    /// Invalid index magic bytes.
    #[error("invalid index magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// Unknown endianness marker.
    #[error("invalid endianness marker: {0:#04x}")]
    InvalidEndian(u8),

    /// Structurally invalid index data.
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    /// Unknown index version tag.
    #[error("unknown index version: {0}")]
    UnknownVersion(String),

    /// Payload decryption error.
    #[error("decryption error: {0}")]
    Decryption(String),
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
