//! RSA decryption of protected archive indices.
//!
//! Protected indices are a sequence of raw RSA blocks produced with the
//! publisher's private key, so they are opened with the public key: each block
//! goes through the bare `c^e mod n` primitive with no padding scheme. Output
//! blocks are one byte shorter than the modulus and are left-padded with zeros
//! when the primitive yields fewer bytes.

use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};

use crate::{Error, Result, BHD5_MAGIC};

/// PEM-encoded RSA public key for one archive.
#[derive(Clone, PartialEq, Eq)]
pub struct ArchiveKey {
    pem: String,
}

impl ArchiveKey {
    /// Wrap PEM text.
    pub fn new(pem: impl Into<String>) -> Self {
        Self { pem: pem.into() }
    }

    /// Read a `.pem` key file.
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        fs::read_to_string(path).map(Self::new)
    }

    /// Get the PEM text.
    pub fn as_pem(&self) -> &str {
        &self.pem
    }
}

impl fmt::Debug for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveKey")
            .field("pem_len", &self.pem.len())
            .finish()
    }
}

impl From<&str> for ArchiveKey {
    fn from(pem: &str) -> Self {
        Self::new(pem)
    }
}

impl From<String> for ArchiveKey {
    fn from(pem: String) -> Self {
        Self::new(pem)
    }
}

/// Check whether an index needs decrypting, given its first bytes.
///
/// Clear indices start with the `BHD5` magic; anything else is ciphertext.
#[inline]
pub fn is_encrypted(probe: &[u8]) -> bool {
    probe.get(..BHD5_MAGIC.len()) != Some(&BHD5_MAGIC[..])
}

/// Decrypt a whole index stream with the given key.
///
/// The returned cursor is positioned at the start of the plaintext.
pub fn decrypt_index<R: Read>(reader: R, key: &ArchiveKey) -> Result<Cursor<Vec<u8>>> {
    IndexDecryptor::new(key)?.decrypt(reader)
}

/// Raw RSA block decryptor bound to one public key.
#[derive(Debug, Clone)]
pub struct IndexDecryptor {
    key: RsaPublicKey,
    input_block_size: usize,
    output_block_size: usize,
}

impl IndexDecryptor {
    /// Parse the key and derive the block sizes from its modulus.
    pub fn new(key: &ArchiveKey) -> Result<Self> {
        let key = parse_public_key(key.as_pem())?;
        let bits = key.n().bits();
        if bits < 16 {
            return Err(Error::InvalidKey(format!("modulus too small: {bits} bits")));
        }

        Ok(Self {
            input_block_size: key.size(),
            output_block_size: (bits - 1) / 8,
            key,
        })
    }

    /// Size of one ciphertext block in bytes.
    #[inline]
    pub fn input_block_size(&self) -> usize {
        self.input_block_size
    }

    /// Size of one plaintext block in bytes.
    #[inline]
    pub fn output_block_size(&self) -> usize {
        self.output_block_size
    }

    /// Decrypt a single block and append the padded result to `output`.
    pub fn decrypt_block(&self, index: usize, block: &[u8], output: &mut Vec<u8>) -> Result<()> {
        let cipher = BigUint::from_bytes_be(block);
        if &cipher >= self.key.n() {
            return Err(Error::BlockOutOfRange { index });
        }

        let plain = rsa::hazmat::rsa_encrypt(&self.key, &cipher)
            .map_err(|e| Error::Decryption(e.to_string()))?
            .to_bytes_be();

        if plain.len() > self.output_block_size {
            return Err(Error::BlockOverflow {
                index,
                len: plain.len(),
                max: self.output_block_size,
            });
        }

        let padding = self.output_block_size - plain.len();
        output.resize(output.len() + padding, 0);
        output.extend_from_slice(&plain);
        Ok(())
    }

    /// Decrypt every block of a stream.
    pub fn decrypt<R: Read>(&self, mut reader: R) -> Result<Cursor<Vec<u8>>> {
        let mut block = vec![0u8; self.input_block_size];
        let mut output = Vec::new();
        let mut index = 0;

        loop {
            let read = read_full(&mut reader, &mut block)?;
            if read == 0 {
                break;
            }
            if read < block.len() {
                return Err(Error::TruncatedBlock {
                    expected: block.len(),
                    actual: read,
                });
            }

            self.decrypt_block(index, &block, &mut output)?;
            index += 1;
        }

        tracing::debug!(
            blocks = index,
            input_block = self.input_block_size,
            output_block = self.output_block_size,
            "decrypted index"
        );

        Ok(Cursor::new(output))
    }
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    let pem = pem.trim_start_matches('\u{feff}').trim_start();

    RsaPublicKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
        .map_err(|e| Error::InvalidKey(e.to_string()))
}

/// Fill `buf` as far as the reader allows, returning the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
