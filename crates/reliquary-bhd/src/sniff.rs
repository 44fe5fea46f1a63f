//! File type inference for entries without a known name.
//!
//! Checks are ordered; the first matching signature wins.

struct Signature {
    offset: usize,
    magic: &'static [u8],
    extension: &'static str,
}

impl Signature {
    const fn new(offset: usize, magic: &'static [u8], extension: &'static str) -> Self {
        Self {
            offset,
            magic,
            extension,
        }
    }

    #[inline]
    fn matches(&self, data: &[u8]) -> bool {
        data.get(self.offset..self.offset + self.magic.len()) == Some(self.magic)
    }
}

static SIGNATURES: &[Signature] = &[
    Signature::new(0, b"GFX", "gfx"),
    Signature::new(0, b"FSB5", "fsb"),
    Signature::new(0xC, b"ITLIMITER_INFO", "itl"),
    Signature::new(8, b"FEV FMT ", "fev"),
    Signature::new(1, b"Lua", "lua"),
    Signature::new(0, b"DDS ", "dds"),
    Signature::new(0, b"#BOM", "txt"),
    Signature::new(0, b"BHF4", "bhd"),
    Signature::new(0, b"BDF4", "bdt"),
    Signature::new(0, b"ENFL", "entryfilelist"),
    Signature::new(0, b"DCX\0", "dcx"),
];

/// Guess the file extension (without the dot) of an unnamed payload.
pub fn sniff(data: &[u8]) -> Option<&'static str> {
    SIGNATURES
        .iter()
        .find(|sig| sig.matches(data))
        .map(|sig| sig.extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dds() {
        assert_eq!(sniff(&[0x44, 0x44, 0x53, 0x20, 0x7c, 0, 0, 0]), Some("dds"));
    }

    #[test]
    fn test_four_byte_tags() {
        assert_eq!(sniff(b"FSB5\x01\0\0\0"), Some("fsb"));
        assert_eq!(sniff(b"#BOM"), Some("txt"));
        assert_eq!(sniff(b"BHF4xxxx"), Some("bhd"));
        assert_eq!(sniff(b"BDF4xxxx"), Some("bdt"));
        assert_eq!(sniff(b"ENFL\0\0"), Some("entryfilelist"));
        assert_eq!(sniff(b"DCX\0\0\x01\0\0"), Some("dcx"));
    }

    #[test]
    fn test_offset_tags() {
        assert_eq!(sniff(b"GFX\x0a"), Some("gfx"));
        assert_eq!(sniff(b"\x1bLuaQ\0\x01\x04"), Some("lua"));

        let mut fev = b"RIFF\0\0\0\0FEV FMT ".to_vec();
        fev.extend_from_slice(&[0; 8]);
        assert_eq!(sniff(&fev), Some("fev"));

        let mut itl = vec![0u8; 0xC];
        itl.extend_from_slice(b"ITLIMITER_INFO");
        assert_eq!(sniff(&itl), Some("itl"));
    }

    #[test]
    fn test_too_short() {
        assert_eq!(sniff(b""), None);
        assert_eq!(sniff(b"DD"), None);
        assert_eq!(sniff(b"DDS"), None);
        let mut itl = vec![0u8; 0xC];
        itl.extend_from_slice(b"ITLIMITER_INF");
        assert_eq!(sniff(&itl), None);
    }

    #[test]
    fn test_priority_order() {
        // The limiter tag is checked before the texture tag
        let mut both = b"DDS \0\0\0\0\0\0\0\0".to_vec();
        both.extend_from_slice(b"ITLIMITER_INFO");
        assert_eq!(sniff(&both), Some("itl"));

        let mut fev = b"FSB5\0\0\0\0FEV FMT ".to_vec();
        fev.extend_from_slice(&[0; 4]);
        assert_eq!(sniff(&fev), Some("fsb"));
    }

    #[test]
    fn test_no_match() {
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n"), None);
        assert_eq!(sniff(b"dds "), None);
    }
}
