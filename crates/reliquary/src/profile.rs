//! Per-title configuration supplied by the driver.

use reliquary_bhd::IndexVersion;

const GIB: u64 = 1024 * 1024 * 1024;

/// Everything the engine needs to know about one game title.
///
/// The engine does not define an on-disk format; with the `serde` feature the
/// driver can deserialize this from whatever it prefers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameProfile {
    /// Free space a full unpack needs, in GiB.
    pub required_gb: u64,
    /// Layout version of the title's archive indices.
    pub index_version: IndexVersion,
    /// Archive base names in unpack order, e.g. `Data1` or `GameDataEbl`.
    pub archives: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub backup_dirs: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub delete_dirs: Vec<String>,
    /// Executable aliases neutralized by the patcher, in order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub replacements: Vec<String>,
}

impl GameProfile {
    pub fn required_bytes(&self) -> u64 {
        self.required_gb.saturating_mul(GIB)
    }

    /// Bytes missing for a full unpack when `available` bytes are free, or
    /// `None` when there is enough space.
    pub fn space_shortfall(&self, available: u64) -> Option<u64> {
        self.required_bytes()
            .checked_sub(available)
            .filter(|&missing| missing > 0)
    }
}
