//! BHD5 index reader.
//!
//! A BHD5 index is a hash table: a header, an array of buckets, and for each
//! bucket an array of file headers pointing into the companion data file.
//! Indices are little-endian on PC and big-endian on console builds.

mod header;

use std::io::{self, Cursor, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use reliquary_common::PathHash;

use crate::index::{Bucket, FileHeader, IndexReader, IndexVersion};
use crate::{Error, Result, BHD5_MAGIC};

pub use header::{AesKey, Bhd5FileHeader, Range};

/// A parsed BHD5 index.
#[derive(Debug, Clone)]
pub struct Bhd5Index {
    pub big_endian: bool,
    pub salt: Option<String>,
    pub buckets: Vec<Vec<Bhd5FileHeader>>,
}

impl Bhd5Index {
    /// Parse a plaintext index.
    pub fn parse(data: &[u8], version: IndexVersion) -> Result<Self> {
        let magic: [u8; 4] = data
            .get(..4)
            .and_then(|m| m.try_into().ok())
            .ok_or(Error::InvalidMagic {
                expected: *BHD5_MAGIC,
                actual: [0; 4],
            })?;
        if &magic != BHD5_MAGIC {
            return Err(Error::InvalidMagic {
                expected: *BHD5_MAGIC,
                actual: magic,
            });
        }

        let big_endian = match data.get(4).copied() {
            Some(0xFF) => false,
            Some(0x00) => true,
            Some(other) => return Err(Error::InvalidEndian(other)),
            None => return Err(Error::InvalidIndex("missing endianness marker".into())),
        };

        let mut reader = IndexCursor::new(data, big_endian);
        reader.seek(8)?;

        let format = reader.read_i32()?;
        if format != 1 {
            return Err(Error::InvalidIndex(format!("unexpected format value {format}")));
        }
        let _file_size = reader.read_i32()?;
        let bucket_count = reader.read_count()?;
        let buckets_offset = reader.read_offset32()?;

        let salt = if version >= IndexVersion::DarkSouls2 {
            let salt_len = reader.read_count()?;
            let bytes = reader.read_bytes(salt_len)?;
            Some(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            None
        };

        reader.seek(buckets_offset)?;
        let mut buckets = Vec::with_capacity(bucket_count.min(0x10000));
        for _ in 0..bucket_count {
            let header_count = reader.read_count()?;
            let headers_offset = reader.read_offset32()?;
            let resume = reader.position();

            reader.seek(headers_offset)?;
            let mut bucket = Vec::with_capacity(header_count.min(0x10000));
            for _ in 0..header_count {
                bucket.push(read_file_header(&mut reader, version)?);
            }
            buckets.push(bucket);

            reader.seek(resume)?;
        }

        Ok(Self {
            big_endian,
            salt,
            buckets,
        })
    }

    /// Total number of file headers across all buckets.
    pub fn file_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

/// [`IndexReader`] for the BHD5 layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bhd5Reader;

impl IndexReader for Bhd5Reader {
    fn read_index(&self, index: &mut dyn Read, version: IndexVersion) -> io::Result<Vec<Bucket>> {
        let mut data = Vec::new();
        index.read_to_end(&mut data)?;

        let parsed = Bhd5Index::parse(&data, version)?;
        tracing::debug!(
            buckets = parsed.buckets.len(),
            files = parsed.file_count(),
            big_endian = parsed.big_endian,
            "parsed BHD5 index"
        );

        Ok(parsed
            .buckets
            .into_iter()
            .map(|bucket| {
                bucket
                    .into_iter()
                    .map(|header| Box::new(header) as Box<dyn FileHeader>)
                    .collect()
            })
            .collect())
    }
}

fn read_file_header(reader: &mut IndexCursor<'_>, version: IndexVersion) -> Result<Bhd5FileHeader> {
    let name_hash = PathHash(reader.read_u32()?);
    let padded_file_size = u32::try_from(reader.read_i32()?)
        .map_err(|_| Error::InvalidIndex("negative padded file size".into()))?;
    let file_offset = reader.read_offset64()?;

    let mut aes_key = None;
    if version >= IndexVersion::DarkSouls2 {
        let _sha_hash_offset = reader.read_i64()?;
        let aes_key_offset = reader.read_i64()?;
        if aes_key_offset != 0 {
            let offset = u64::try_from(aes_key_offset)
                .map_err(|_| Error::InvalidIndex("negative AES key offset".into()))?;
            let resume = reader.position();
            reader.seek(offset)?;
            aes_key = Some(read_aes_key(reader)?);
            reader.seek(resume)?;
        }
    }

    let unpadded_file_size = if version >= IndexVersion::DarkSouls3 {
        Some(reader.read_offset64()?)
    } else {
        None
    };

    Ok(Bhd5FileHeader {
        name_hash,
        padded_file_size,
        file_offset,
        unpadded_file_size,
        aes_key,
    })
}

fn read_aes_key(reader: &mut IndexCursor<'_>) -> Result<AesKey> {
    let mut key = [0u8; 16];
    key.copy_from_slice(&reader.read_bytes(16)?);

    let range_count = reader.read_count()?;
    let mut ranges = Vec::with_capacity(range_count.min(0x100));
    for _ in 0..range_count {
        let start = reader.read_i64()?;
        let end = reader.read_i64()?;
        ranges.push(Range { start, end });
    }

    Ok(AesKey { key, ranges })
}

/// Endian-aware cursor over the index bytes.
struct IndexCursor<'a> {
    inner: Cursor<&'a [u8]>,
    big_endian: bool,
}

impl<'a> IndexCursor<'a> {
    fn new(data: &'a [u8], big_endian: bool) -> Self {
        Self {
            inner: Cursor::new(data),
            big_endian,
        }
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        let len = self.inner.get_ref().len() as u64;
        if position > len {
            return Err(Error::InvalidIndex(format!(
                "offset {position:#x} beyond {len}-byte index"
            )));
        }
        self.inner.set_position(position);
        Ok(())
    }

    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let remaining = self.inner.get_ref().len() as u64 - self.position();
        if count as u64 > remaining {
            return Err(Error::InvalidIndex(format!(
                "{count}-byte field overruns index ({remaining} bytes left)"
            )));
        }
        let mut bytes = vec![0u8; count];
        self.inner.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(if self.big_endian {
            self.inner.read_u32::<BigEndian>()?
        } else {
            self.inner.read_u32::<LittleEndian>()?
        })
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(if self.big_endian {
            self.inner.read_i32::<BigEndian>()?
        } else {
            self.inner.read_i32::<LittleEndian>()?
        })
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(if self.big_endian {
            self.inner.read_i64::<BigEndian>()?
        } else {
            self.inner.read_i64::<LittleEndian>()?
        })
    }

    fn read_count(&mut self) -> Result<usize> {
        let value = self.read_i32()?;
        usize::try_from(value).map_err(|_| Error::InvalidIndex(format!("negative count {value}")))
    }

    fn read_offset32(&mut self) -> Result<u64> {
        let value = self.read_i32()?;
        u64::try_from(value).map_err(|_| Error::InvalidIndex(format!("negative offset {value}")))
    }

    fn read_offset64(&mut self) -> Result<u64> {
        let value = self.read_i64()?;
        u64::try_from(value).map_err(|_| Error::InvalidIndex(format!("negative offset {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::Aes128;
    use cipher::generic_array::GenericArray;
    use cipher::{BlockEncrypt, KeyInit};

    /// Minimal BHD5 writer for fixtures.
    struct Builder {
        big_endian: bool,
        version: IndexVersion,
        buckets: Vec<Vec<(u32, u32, u64, Option<([u8; 16], Vec<(i64, i64)>)>)>>,
    }

    impl Builder {
        fn i32(&self, out: &mut Vec<u8>, v: i32) {
            if self.big_endian {
                out.extend_from_slice(&v.to_be_bytes());
            } else {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }

        fn i64(&self, out: &mut Vec<u8>, v: i64) {
            if self.big_endian {
                out.extend_from_slice(&v.to_be_bytes());
            } else {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }

        fn header_size(&self) -> usize {
            match self.version {
                IndexVersion::DarkSouls1 => 16,
                IndexVersion::DarkSouls2 => 32,
                _ => 40,
            }
        }

        fn build(&self) -> Vec<u8> {
            let salt = b"NTC_TEST_SALT";
            let mut out = b"BHD5".to_vec();
            out.push(if self.big_endian { 0x00 } else { 0xFF });
            out.extend_from_slice(&[0, 0, 0]);
            self.i32(&mut out, 1);
            self.i32(&mut out, 0);
            self.i32(&mut out, self.buckets.len() as i32);
            let has_salt = self.version >= IndexVersion::DarkSouls2;
            let buckets_offset = 24 + if has_salt { 4 + salt.len() } else { 0 };
            self.i32(&mut out, buckets_offset as i32);
            if has_salt {
                self.i32(&mut out, salt.len() as i32);
                out.extend_from_slice(salt);
            }

            let headers_start = buckets_offset + self.buckets.len() * 8;
            let total_headers: usize = self.buckets.iter().map(Vec::len).sum();
            let mut key_offset = headers_start + total_headers * self.header_size();

            let mut headers = Vec::new();
            let mut keys = Vec::new();
            let mut header_offset = headers_start;
            for bucket in &self.buckets {
                self.i32(&mut out, bucket.len() as i32);
                self.i32(&mut out, header_offset as i32);
                header_offset += bucket.len() * self.header_size();

                for (hash, padded, offset, aes) in bucket {
                    self.i32(&mut headers, *hash as i32);
                    self.i32(&mut headers, *padded as i32);
                    self.i64(&mut headers, *offset as i64);
                    if self.version >= IndexVersion::DarkSouls2 {
                        self.i64(&mut headers, 0);
                        match aes {
                            Some((key, ranges)) => {
                                self.i64(&mut headers, key_offset as i64);
                                keys.extend_from_slice(key);
                                self.i32(&mut keys, ranges.len() as i32);
                                for (s, e) in ranges {
                                    self.i64(&mut keys, *s);
                                    self.i64(&mut keys, *e);
                                }
                                key_offset += 20 + ranges.len() * 16;
                            }
                            None => self.i64(&mut headers, 0),
                        }
                    }
                    if self.version >= IndexVersion::DarkSouls3 {
                        self.i64(&mut headers, i64::from(*padded) - 2);
                    }
                }
            }

            out.extend_from_slice(&headers);
            out.extend_from_slice(&keys);
            out
        }
    }

    #[test]
    fn test_parse_little_endian_ds3() {
        let builder = Builder {
            big_endian: false,
            version: IndexVersion::DarkSouls3,
            buckets: vec![
                vec![(10, 32, 0, None), (20, 16, 32, None)],
                vec![],
                vec![(30, 48, 48, Some(([7; 16], vec![(0, 16), (-1, -1)])))],
            ],
        };
        let index = Bhd5Index::parse(&builder.build(), IndexVersion::DarkSouls3).unwrap();

        assert!(!index.big_endian);
        assert_eq!(index.salt.as_deref(), Some("NTC_TEST_SALT"));
        assert_eq!(index.buckets.len(), 3);
        assert_eq!(index.file_count(), 3);

        let hashes: Vec<u32> = index
            .buckets
            .iter()
            .flatten()
            .map(|h| h.name_hash.value())
            .collect();
        assert_eq!(hashes, [10, 20, 30]);

        let last = &index.buckets[2][0];
        assert_eq!(last.file_offset, 48);
        assert_eq!(last.unpadded_file_size, Some(46));
        let key = last.aes_key.as_ref().unwrap();
        assert_eq!(key.key, [7; 16]);
        assert_eq!(key.ranges, [Range { start: 0, end: 16 }, Range { start: -1, end: -1 }]);
    }

    #[test]
    fn test_parse_big_endian_ds1() {
        let builder = Builder {
            big_endian: true,
            version: IndexVersion::DarkSouls1,
            buckets: vec![vec![(0xDEADBEEF, 64, 128, None)]],
        };
        let index = Bhd5Index::parse(&builder.build(), IndexVersion::DarkSouls1).unwrap();

        assert!(index.big_endian);
        assert!(index.salt.is_none());
        let header = &index.buckets[0][0];
        assert_eq!(header.name_hash, PathHash(0xDEADBEEF));
        assert_eq!(header.padded_file_size, 64);
        assert_eq!(header.file_offset, 128);
        assert_eq!(header.unpadded_file_size, None);
    }

    #[test]
    fn test_invalid_magic() {
        let err = Bhd5Index::parse(b"BHF4\xff\0\0\0", IndexVersion::DarkSouls3).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic { actual, .. } if &actual == b"BHF4"));
        assert!(matches!(
            Bhd5Index::parse(b"BH", IndexVersion::DarkSouls3),
            Err(Error::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_invalid_endian() {
        let err = Bhd5Index::parse(b"BHD5\x01\0\0\0", IndexVersion::DarkSouls3).unwrap_err();
        assert!(matches!(err, Error::InvalidEndian(0x01)));
    }

    #[test]
    fn test_truncated_index() {
        let builder = Builder {
            big_endian: false,
            version: IndexVersion::Sekiro,
            buckets: vec![vec![(1, 16, 0, None)]],
        };
        let data = builder.build();
        assert!(Bhd5Index::parse(&data[..data.len() - 4], IndexVersion::Sekiro).is_err());
    }

    #[test]
    fn test_reader_end_to_end() {
        let key = *b"sixteen byte key";
        let plain = b"FSB5 sound bank payload, 32 byte".to_vec();
        let mut stored = plain.clone();
        let cipher = Aes128::new(GenericArray::from_slice(&key));
        for block in stored.chunks_exact_mut(16) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }

        let builder = Builder {
            big_endian: false,
            version: IndexVersion::DarkSouls2,
            buckets: vec![vec![(99, 32, 0, Some((key, vec![(0, 32)])))]],
        };
        let index = builder.build();

        let buckets = Bhd5Reader
            .read_index(&mut &index[..], IndexVersion::DarkSouls2)
            .unwrap();
        assert_eq!(buckets.len(), 1);
        let header = &buckets[0][0];
        assert_eq!(header.name_hash(), PathHash(99));
        assert_eq!(header.file_size(), 32);

        let mut data = Cursor::new(stored);
        assert_eq!(FileHeader::read(header.as_ref(), &mut data).unwrap(), plain);
    }

    #[test]
    fn test_reader_reports_invalid_data() {
        let err = Bhd5Reader
            .read_index(&mut &b"nope"[..], IndexVersion::DarkSouls3)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
