//! BHD5 file header records.

use std::io::{self, SeekFrom};

use aes::Aes128;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, KeyInit};

use reliquary_common::PathHash;

use crate::index::{DataStream, FileHeader};
use crate::{Error, Result};

const AES_BLOCK: usize = 16;

/// Byte range of a payload, `-1` on either end meaning "unused".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub end: i64,
}

impl Range {
    /// Whether the range covers any encrypted bytes.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.start != -1 && self.end != -1 && self.start != self.end
    }
}

/// AES-128 key and the payload ranges it covers.
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey {
    pub key: [u8; 16],
    pub ranges: Vec<Range>,
}

impl AesKey {
    /// Decrypt the covered ranges of a payload in place (ECB, no padding).
    pub fn decrypt(&self, data: &mut [u8]) -> Result<()> {
        let cipher = Aes128::new(GenericArray::from_slice(&self.key));

        for range in self.ranges.iter().filter(|r| r.is_active()) {
            let (start, end) = match (usize::try_from(range.start), usize::try_from(range.end)) {
                (Ok(start), Ok(end)) if start <= end && end <= data.len() => (start, end),
                _ => {
                    return Err(Error::Decryption(format!(
                        "range {}..{} outside {}-byte payload",
                        range.start,
                        range.end,
                        data.len()
                    )))
                }
            };

            if (end - start) % AES_BLOCK != 0 {
                return Err(Error::Decryption(format!(
                    "range {start}..{end} is not a multiple of the AES block size"
                )));
            }

            for block in data[start..end].chunks_exact_mut(AES_BLOCK) {
                cipher.decrypt_block(GenericArray::from_mut_slice(block));
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesKey")
            .field("ranges", &self.ranges)
            .finish_non_exhaustive()
    }
}

/// One entry of a BHD5 bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bhd5FileHeader {
    pub name_hash: PathHash,
    pub padded_file_size: u32,
    pub file_offset: u64,
    pub unpadded_file_size: Option<u64>,
    pub aes_key: Option<AesKey>,
}

impl Bhd5FileHeader {
    /// Read the payload from the data file, decrypting covered ranges.
    pub fn read_payload(&self, data: &mut dyn DataStream) -> Result<Vec<u8>> {
        data.seek(SeekFrom::Start(self.file_offset))?;

        let mut bytes = vec![0u8; self.padded_file_size as usize];
        data.read_exact(&mut bytes)?;

        if let Some(key) = &self.aes_key {
            key.decrypt(&mut bytes)?;
        }

        Ok(bytes)
    }
}

impl FileHeader for Bhd5FileHeader {
    fn name_hash(&self) -> PathHash {
        self.name_hash
    }

    fn file_size(&self) -> u64 {
        self.unpadded_file_size.unwrap_or(u64::from(self.padded_file_size))
    }

    fn padded_file_size(&self) -> u64 {
        u64::from(self.padded_file_size)
    }

    fn read(&self, data: &mut dyn DataStream) -> io::Result<Vec<u8>> {
        self.read_payload(data).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipher::BlockEncrypt;
    use std::io::Cursor;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    fn encrypt(data: &mut [u8]) {
        let cipher = Aes128::new(GenericArray::from_slice(&KEY));
        for block in data.chunks_exact_mut(AES_BLOCK) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
    }

    #[test]
    fn test_decrypt_ranges() {
        let plain: Vec<u8> = (0..64u8).collect();
        let mut data = plain.clone();
        encrypt(&mut data[16..48]);

        let key = AesKey {
            key: KEY,
            ranges: vec![
                Range { start: 16, end: 48 },
                Range { start: -1, end: -1 },
                Range { start: 8, end: 8 },
            ],
        };
        key.decrypt(&mut data).unwrap();
        assert_eq!(data, plain);
    }

    #[test]
    fn test_decrypt_range_out_of_bounds() {
        let key = AesKey {
            key: KEY,
            ranges: vec![Range { start: 0, end: 32 }],
        };
        assert!(matches!(key.decrypt(&mut [0u8; 16]), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_decrypt_unaligned_range() {
        let key = AesKey {
            key: KEY,
            ranges: vec![Range { start: 0, end: 15 }],
        };
        assert!(matches!(key.decrypt(&mut [0u8; 16]), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_read_payload() {
        let mut stored = vec![0xAAu8; 8];
        let mut payload = b"DCX\0 payload body with padding..".to_vec();
        encrypt(&mut payload[..32]);
        stored.extend_from_slice(&payload);

        let header = Bhd5FileHeader {
            name_hash: PathHash(7),
            padded_file_size: 32,
            file_offset: 8,
            unpadded_file_size: Some(30),
            aes_key: Some(AesKey {
                key: KEY,
                ranges: vec![Range { start: 0, end: 32 }],
            }),
        };

        let mut data = Cursor::new(stored);
        let bytes = FileHeader::read(&header, &mut data).unwrap();
        assert_eq!(&bytes, b"DCX\0 payload body with padding..");
        assert_eq!(header.file_size(), 30);
        assert_eq!(FileHeader::padded_file_size(&header), 32);
    }

    #[test]
    fn test_read_past_end() {
        let header = Bhd5FileHeader {
            name_hash: PathHash(1),
            padded_file_size: 16,
            file_offset: 4,
            unpadded_file_size: None,
            aes_key: None,
        };
        let err = FileHeader::read(&header, &mut Cursor::new(vec![0u8; 10])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(header.file_size(), 16);
    }
}
