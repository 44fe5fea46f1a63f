//! Fixed-width byte pattern substitution.

use memchr::memmem;

use crate::{Error, Result};

/// Encode a string as UTF-16LE bytes.
pub fn encode_utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Placeholder for an alias: a dot followed by slashes, same UTF-16 length.
pub fn alias_replacement(target: &str) -> String {
    let units = target.encode_utf16().count();
    let mut replacement = String::with_capacity(units);
    if units > 0 {
        replacement.push('.');
        replacement.extend(std::iter::repeat('/').take(units - 1));
    }
    replacement
}

/// Find every offset where `needle` occurs in `haystack`, overlapping matches included.
pub fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    if needle.is_empty() {
        return offsets;
    }

    let finder = memmem::Finder::new(needle);
    let mut position = 0;
    while let Some(found) = finder.find(&haystack[position..]) {
        offsets.push(position + found);
        position += found + 1;
    }

    offsets
}

/// Overwrite every UTF-16LE occurrence of `target` with `replacement`.
///
/// Matches are located on the unmodified image first, then overwritten, so
/// overlapping occurrences are all rewritten. Returns the number of matches.
pub fn replace_all(image: &mut [u8], target: &str, replacement: &str) -> Result<usize> {
    let target_bytes = encode_utf16le(target);
    let replacement_bytes = encode_utf16le(replacement);

    if target_bytes.len() != replacement_bytes.len() {
        return Err(Error::LengthMismatch {
            target: target_bytes.len(),
            replacement: replacement_bytes.len(),
        });
    }
    if target_bytes.is_empty() {
        return Err(Error::EmptyTarget);
    }

    let offsets = find_all(image, &target_bytes);
    for &offset in &offsets {
        image[offset..offset + replacement_bytes.len()].copy_from_slice(&replacement_bytes);
    }

    tracing::debug!(target, replacement, occurrences = offsets.len(), "replaced alias");
    Ok(offsets.len())
}

/// Neutralize each alias in order, returning the match count per alias.
///
/// Later aliases are matched against the image as already patched by earlier ones.
pub fn patch_aliases<S: AsRef<str>>(image: &mut [u8], aliases: &[S]) -> Result<Vec<usize>> {
    aliases
        .iter()
        .map(|alias| {
            let target = alias.as_ref();
            replace_all(image, target, &alias_replacement(target))
        })
        .collect()
}
