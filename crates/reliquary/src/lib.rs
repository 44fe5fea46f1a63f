//! Reliquary - sealed game archive extraction and executable patching.
//!
//! This crate ties the Reliquary library crates together and adds the
//! extraction engine and executable patch flow.
//!
//! # Crates
//!
//! - [`reliquary_common`] - Path hashing and hash dictionaries
//! - [`reliquary_bhd`] - Index decryption, BHD5 reading and content sniffing
//! - [`reliquary_exe`] - Fixed-width UTF-16 alias patching
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use reliquary::prelude::*;
//!
//! let game_dir = Path::new("C:/Games/DARK SOULS III/Game");
//! let profile = GameProfile {
//!     required_gb: 25,
//!     index_version: IndexVersion::DarkSouls3,
//!     archives: vec!["Data1".into(), "Data2".into()],
//!     backup_dirs: Vec::new(),
//!     delete_dirs: Vec::new(),
//!     replacements: vec!["data1:".into(), "data2:".into()],
//! };
//! let dictionary = HashDictionary::load("DarkSouls3Dictionary.txt")?;
//! let keys = SidecarKeyStore::new("keys");
//!
//! let ctx = Context::silent();
//! let session = UnpackSession {
//!     game_dir,
//!     profile: &profile,
//!     dictionary: &dictionary,
//!     keys: &keys,
//! };
//! Unpacker::bhd5().unpack(&ctx, &session)?;
//! ExePatcher::patch(&ctx, &game_dir.join("DarkSoulsIII.exe"), &profile)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod writer;

pub mod context;
pub mod keys;
pub mod patch;
pub mod profile;
pub mod unpack;

pub use reliquary_bhd as bhd;
pub use reliquary_common as common;
pub use reliquary_exe as exe;

pub use error::{Error, Result};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::{CancelToken, Context, NoProgress, ProgressSink};
    pub use crate::keys::{KeyStore, SidecarKeyStore, StaticKeyStore};
    pub use crate::patch::{ExePatcher, PatchOutcome};
    pub use crate::profile::GameProfile;
    pub use crate::unpack::{
        ArchiveJob, ArchiveOutcome, ArchiveStats, UnpackOptions, UnpackOutcome, UnpackSession,
        Unpacker,
    };
    pub use reliquary_bhd::{ArchiveKey, IndexReader, IndexVersion};
    pub use reliquary_common::{HashDictionary, PathHash};
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
