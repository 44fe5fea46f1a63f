//! Archive index support for BHD5/BDT container pairs.
//!
//! A sealed archive is an index file (`.bhd`) describing where each payload
//! lives, paired with a data file (`.bdt`) holding the payloads. This crate
//! provides:
//!
//! - [`crypto`] - RSA block decryption of protected indices
//! - [`index`] - The [`IndexReader`] / [`FileHeader`] collaborator traits
//! - [`bhd5`] - A reader for the BHD5 index layout
//! - [`sniff`] - Extension inference for payloads with unknown names
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//!
//! use reliquary_bhd::bhd5::Bhd5Reader;
//! use reliquary_bhd::crypto::{self, ArchiveKey};
//! use reliquary_bhd::{IndexReader, IndexVersion};
//!
//! let key = ArchiveKey::load("Data1KeyCode.pem")?;
//! let mut bhd = crypto::decrypt_index(File::open("Data1.bhd")?, &key)?;
//! let buckets = Bhd5Reader.read_index(&mut bhd, IndexVersion::DarkSouls3)?;
//!
//! let mut bdt = File::open("Data1.bdt")?;
//! for header in buckets.iter().flatten() {
//!     let payload = header.read(&mut bdt)?;
//!     println!("{}: {} bytes", header.name_hash(), payload.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;

pub mod bhd5;
pub mod crypto;
pub mod index;
pub mod sniff;

pub use crypto::ArchiveKey;
pub use error::{Error, Result};
pub use index::{Bucket, DataStream, FileHeader, IndexReader, IndexVersion};

/// Magic bytes of a plaintext BHD5 index.
pub const BHD5_MAGIC: &[u8; 4] = b"BHD5";
