//! Error types for executable patching.

use thiserror::Error;

/// Errors that can occur when patching an executable image.
#[derive(Debug, Error)]
pub enum Error {
    /// Target and replacement encode to different byte lengths.
    #[error("target length: {target} | replacement length: {replacement}")]
    LengthMismatch { target: usize, replacement: usize },

    /// An empty target would match at every offset.
    #[error("patch target is empty")]
    EmptyTarget,
}

/// Result type for patch operations.
pub type Result<T> = std::result::Result<T, Error>;
