//! Common utilities for Reliquary.
//!
//! This crate provides the name-resolution primitives shared by the archive and
//! engine crates:
//!
//! - [`hash`] - Path normalization and the 32-bit path hash used by archive indices
//! - [`HashDictionary`] - Reverse lookup from path hashes to known file names

mod dictionary;

pub mod hash;

pub use dictionary::HashDictionary;
pub use hash::PathHash;
