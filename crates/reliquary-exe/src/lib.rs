//! In-place alias patching for game executables.
//!
//! Executables embed virtual path aliases (for example `data1:`) as UTF-16LE
//! strings. Overwriting each alias with a placeholder of the same encoded
//! length makes the game fall back to loose files next to the executable,
//! without shifting a single byte of the image.
//!
//! # Example
//!
//! ```
//! use reliquary_exe::{alias_replacement, encode_utf16le, replace_all};
//!
//! let mut image = encode_utf16le("xx data1: yy");
//! let count = replace_all(&mut image, "data1:", &alias_replacement("data1:"))?;
//!
//! assert_eq!(count, 1);
//! assert_eq!(image, encode_utf16le("xx .///// yy"));
//! # Ok::<(), reliquary_exe::Error>(())
//! ```

mod error;
mod patch;

pub use error::{Error, Result};
pub use patch::{alias_replacement, encode_utf16le, find_all, patch_aliases, replace_all};
