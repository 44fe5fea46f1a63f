//! Archive key lookup.

use std::path::{Path, PathBuf};

use reliquary_bhd::ArchiveKey;
use rustc_hash::FxHashMap;

use crate::{Error, Result};

/// Supplies the RSA public key protecting each archive index.
pub trait KeyStore: Send + Sync {
    fn key(&self, archive: &str) -> Result<ArchiveKey>;
}

/// Reads keys from PEM files shipped next to the archives.
///
/// The key for `GameDataEbl` lives in `GameDataKeyCode.pem`.
#[derive(Debug, Clone)]
pub struct SidecarKeyStore {
    dir: PathBuf,
}

impl SidecarKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the key file for an archive.
    pub fn key_path(&self, archive: &str) -> PathBuf {
        self.dir.join(format!("{}.pem", archive.replace("Ebl", "KeyCode")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl KeyStore for SidecarKeyStore {
    fn key(&self, archive: &str) -> Result<ArchiveKey> {
        let path = self.key_path(archive);
        ArchiveKey::load(&path).map_err(|source| Error::KeyFile {
            archive: archive.to_string(),
            path,
            source,
        })
    }
}

/// Keys held in memory, keyed by archive name.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyStore {
    keys: FxHashMap<String, ArchiveKey>,
}

impl StaticKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, archive: impl Into<String>, key: impl Into<ArchiveKey>) {
        self.keys.insert(archive.into(), key.into());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<A, K> FromIterator<(A, K)> for StaticKeyStore
where
    A: Into<String>,
    K: Into<ArchiveKey>,
{
    fn from_iter<I: IntoIterator<Item = (A, K)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (archive, key) in iter {
            store.insert(archive, key);
        }
        store
    }
}

impl KeyStore for StaticKeyStore {
    fn key(&self, archive: &str) -> Result<ArchiveKey> {
        self.keys
            .get(archive)
            .cloned()
            .ok_or_else(|| Error::MissingKey {
                archive: archive.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PEM: &str = "-----BEGIN RSA PUBLIC KEY-----\nAAAA\n-----END RSA PUBLIC KEY-----\n";

    #[test]
    fn test_sidecar_key_path() {
        let store = SidecarKeyStore::new("/game");
        assert_eq!(
            store.key_path("GameDataEbl"),
            Path::new("/game/GameDataKeyCode.pem")
        );
        assert_eq!(store.key_path("Data1"), Path::new("/game/Data1.pem"));
    }

    #[test]
    fn test_sidecar_loads_key() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("HqChrKeyCode.pem"), PEM).unwrap();

        let store = SidecarKeyStore::new(dir.path());
        assert_eq!(store.key("HqChrEbl").unwrap().as_pem(), PEM);

        match store.key("LqChrEbl") {
            Err(Error::KeyFile { archive, path, .. }) => {
                assert_eq!(archive, "LqChrEbl");
                assert_eq!(path, dir.path().join("LqChrKeyCode.pem"));
            }
            other => panic!("expected KeyFile error, got {other:?}"),
        }
    }

    #[test]
    fn test_static_store() {
        let store: StaticKeyStore = [("Data1", PEM)].into_iter().collect();
        assert_eq!(store.len(), 1);
        assert_eq!(store.key("Data1").unwrap().as_pem(), PEM);
        assert!(matches!(
            store.key("Data2"),
            Err(Error::MissingKey { archive }) if archive == "Data2"
        ));
    }
}
