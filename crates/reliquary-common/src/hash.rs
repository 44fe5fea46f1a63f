//! Path hashing for archive entry names.
//!
//! Archive indices do not store file names. Each entry is identified by a
//! polynomial rolling hash of its normalized path, computed over UTF-16 code
//! units with a multiplier of 37 and wrapping 32-bit arithmetic.

use std::fmt;

/// Multiplier of the rolling hash.
pub const PRIME: u32 = 37;

/// A 32-bit hash of a normalized archive path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathHash(pub u32);

impl PathHash {
    /// Hash a raw path.
    pub fn of(path: &str) -> Self {
        Self(hash_path(path))
    }

    /// Create a path hash from a raw value.
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw hash value.
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for PathHash {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Formats as a zero-padded 10-digit decimal, the form used for unknown file names.
impl fmt::Display for PathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}", self.0)
    }
}

/// Normalize a path into the form that is fed to the hash.
///
/// Surrounding whitespace is trimmed, backslashes become forward slashes, the
/// path is lowercased one character at a time and a leading `/` is prepended
/// when missing.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim();
    let mut normalized = String::with_capacity(trimmed.len() + 1);
    if !trimmed.starts_with(['/', '\\']) {
        normalized.push('/');
    }
    normalized.extend(trimmed.chars().map(|c| match c {
        '\\' => '/',
        c => lowercase_char(c),
    }));
    normalized
}

/// Simple case mapping: one char in, one char out, no context rules.
///
/// `İ` is the only char whose full lowercase mapping expands; it keeps the
/// leading `i`.
fn lowercase_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Hash an already normalized path.
#[inline]
pub fn hash_normalized(normalized: &str) -> u32 {
    normalized
        .encode_utf16()
        .fold(0u32, |acc, unit| acc.wrapping_mul(PRIME).wrapping_add(u32::from(unit)))
}

/// Normalize and hash a raw path.
#[inline]
pub fn hash_path(path: &str) -> u32 {
    hash_normalized(&normalize(path))
}
