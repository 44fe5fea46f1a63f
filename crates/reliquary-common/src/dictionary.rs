//! Reverse lookup of archive path hashes.
//!
//! Archives only carry [`PathHash`] values, so human-readable names are
//! recovered from a manifest of known paths. Most archives contain entries that
//! are not in any manifest; a failed lookup is expected.

use std::fs;
use std::io;
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::hash::PathHash;

/// Maps path hashes back to the manifest line they were computed from.
#[derive(Debug, Clone, Default)]
pub struct HashDictionary {
    paths: FxHashMap<PathHash, String>,
}

impl HashDictionary {
    /// Build a dictionary from manifest text.
    ///
    /// Lines are separated by any run of CR/LF characters. Blank lines are
    /// skipped; when two lines share a hash the later one wins.
    pub fn parse(text: &str) -> Self {
        Self::from_lines(std::iter::once(text))
    }

    /// Build a dictionary from a sequence of manifest chunks.
    ///
    /// Each item may itself contain several CR/LF separated lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = FxHashMap::default();

        for chunk in lines {
            for line in chunk.as_ref().split(['\r', '\n']) {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                paths.insert(PathHash::of(trimmed), trimmed.to_string());
            }
        }

        Self { paths }
    }

    /// Read and parse a manifest file.
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Look up the known path for a hash.
    #[inline]
    pub fn get(&self, hash: PathHash) -> Option<&str> {
        self.paths.get(&hash).map(String::as_str)
    }

    /// Check whether a hash has a known path.
    #[inline]
    pub fn contains(&self, hash: PathHash) -> bool {
        self.paths.contains_key(&hash)
    }

    /// Number of distinct hashes.
    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if the dictionary is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{hash_normalized, PRIME};

    #[test]
    fn test_lookup_known_path() {
        let dict = HashDictionary::parse("/chr/c0000.anibnd.dcx\r\n");
        let hash = PathHash::of("chr/c0000.anibnd.dcx");
        assert_eq!(dict.get(hash), Some("/chr/c0000.anibnd.dcx"));
        assert_eq!(dict.get(PathHash::of("nonexistent.file")), None);
    }

    #[test]
    fn test_manifest_line_kept_verbatim() {
        let dict = HashDictionary::parse("chr/c0000.anibnd.dcx");
        assert_eq!(
            dict.get(PathHash::of("chr/c0000.anibnd.dcx")),
            Some("chr/c0000.anibnd.dcx")
        );
    }

    #[test]
    fn test_blank_and_whitespace_noise() {
        let dict = HashDictionary::from_lines(["", "  ", "foo.txt", "\r\n", "foo.txt"]);
        assert_eq!(dict.len(), 1);
        assert!(dict.contains(PathHash::of("foo.txt")));
    }

    #[test]
    fn test_duplicate_normalized_paths_last_wins() {
        let dict = HashDictionary::parse("/Foo.txt\n\n\r\r\n  foo.TXT  \n");
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(PathHash::of("foo.txt")), Some("foo.TXT"));
    }

    #[test]
    fn test_crafted_collision_last_wins() {
        // "/ab" and "/b=" collide: 'a'*37 + 'b' == 'b'*37 + ('b' - 37)
        let first = "/ab";
        let second = format!("/b{}", char::from(b'b' - PRIME as u8));
        assert_ne!(first, second);
        assert_eq!(hash_normalized(first), hash_normalized(&second));

        let text = format!("{first}\n{second}\n");
        let dict = HashDictionary::parse(&text);
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(PathHash::of(first)), Some(second.as_str()));

        let reversed = HashDictionary::parse(&format!("{second}\n{first}\n"));
        assert_eq!(reversed.get(PathHash::of(first)), Some(first));
    }

    #[test]
    fn test_many_synthetic_collisions() {
        // Every two-letter tail (x, y) with 37*x + y fixed hashes identically
        let target = 37 * u32::from(b'm') + u32::from(b'm');
        let colliding: Vec<String> = (b'A'..=b'z')
            .filter_map(|x| {
                let y = target.checked_sub(37 * u32::from(x))?;
                let y = u8::try_from(y).ok().filter(u8::is_ascii_graphic)?;
                (y != b'/' && y != b'\\').then(|| format!("/{}{}", x as char, y as char))
            })
            .filter(|p| p.to_lowercase() == *p)
            .collect();
        assert!(colliding.len() >= 2);

        let dict = HashDictionary::from_lines(colliding.iter());
        assert_eq!(dict.len(), 1);
        let last = colliding.last().map(String::as_str);
        assert_eq!(dict.get(PathHash::of("/mm")), last);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.txt");
        fs::write(&path, "/a.txt\r\n/b/c.txt\r\n").unwrap();

        let dict = HashDictionary::load(&path).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get(PathHash::of("B\\C.TXT")), Some("/b/c.txt"));
    }
}
