//! Collaborator interface between the extraction engine and index readers.
//!
//! The engine never looks at the binary layout of an index. It asks an
//! [`IndexReader`] for buckets of [`FileHeader`]s and reads payloads through
//! them.

use std::fmt;
use std::io::{self, Read, Seek};
use std::str::FromStr;

use reliquary_common::PathHash;

use crate::Error;

/// Version of the index layout, selected per title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndexVersion {
    DarkSouls1,
    DarkSouls2,
    DarkSouls3,
    Sekiro,
}

impl IndexVersion {
    /// Name used in title profiles.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DarkSouls1 => "DarkSouls1",
            Self::DarkSouls2 => "DarkSouls2",
            Self::DarkSouls3 => "DarkSouls3",
            Self::Sekiro => "Sekiro",
        }
    }
}

impl fmt::Display for IndexVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DarkSouls1" => Ok(Self::DarkSouls1),
            "DarkSouls2" => Ok(Self::DarkSouls2),
            "DarkSouls3" => Ok(Self::DarkSouls3),
            "Sekiro" => Ok(Self::Sekiro),
            other => Err(Error::UnknownVersion(other.to_string())),
        }
    }
}

/// A seekable byte source for payload reads.
pub trait DataStream: Read + Seek {}

impl<T: Read + Seek> DataStream for T {}

/// Metadata for one file stored in an archive.
pub trait FileHeader: fmt::Debug + Send + Sync {
    /// Hash of the file's path.
    fn name_hash(&self) -> PathHash;

    /// Size of the file content in bytes, when the index records it.
    fn file_size(&self) -> u64;

    /// Size of the stored payload including padding.
    fn padded_file_size(&self) -> u64;

    /// Read (and decrypt, if needed) the payload from the data stream.
    fn read(&self, data: &mut dyn DataStream) -> io::Result<Vec<u8>>;
}

/// Headers sharing one hash-table slot of the index.
pub type Bucket = Vec<Box<dyn FileHeader>>;

/// Parses a plaintext index into buckets of headers.
pub trait IndexReader: Send + Sync {
    /// Read the index. Bucket and header order is preserved as stored.
    fn read_index(&self, index: &mut dyn Read, version: IndexVersion) -> io::Result<Vec<Bucket>>;
}
