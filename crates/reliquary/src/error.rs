//! Error types for the extraction engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while unpacking archives or patching an executable.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error without a more specific location.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Archive index error.
    #[error("{0}")]
    Archive(#[from] reliquary_bhd::Error),

    /// No key is configured for an archive.
    #[error("no key configured for archive {archive}")]
    MissingKey { archive: String },

    /// A key file could not be read.
    #[error("failed to load key for archive {archive} from {path}: {source}")]
    KeyFile {
        archive: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The index file could not be opened or read.
    #[error("failed to open index:\n{path}\n\n{source}")]
    OpenIndex {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The index could not be decrypted.
    #[error("failed to decrypt index:\n{path}\n\n{source}")]
    DecryptIndex {
        path: PathBuf,
        #[source]
        source: reliquary_bhd::Error,
    },

    /// The data file could not be opened.
    #[error("failed to unpack data file:\n{path}\n\n{source}")]
    OpenData {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A payload could not be read from the data file.
    #[error("failed to read file:\n{path}\n\n{source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file could not be written.
    #[error("failed to write file:\n{path}\n\n{source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The executable backup could not be created.
    #[error("failed to back up file:\n{path}\n\n{source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An alias could not be patched.
    #[error("failed to patch file:\n{path}\n\n{source}")]
    Patch {
        path: PathBuf,
        #[source]
        source: reliquary_exe::Error,
    },

    /// The executable path has no parent directory or file name.
    #[error("invalid executable path: {0}")]
    InvalidExePath(PathBuf),

    /// The writer thread pool could not be started.
    #[error("failed to start writer pool: {0}")]
    WriterPool(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
