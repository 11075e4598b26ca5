//! Fixed symmetric cipher shared with the mirror firmware

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{MirrorError, Result};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Key baked into the mirror firmware
pub const DEFAULT_KEY: [u8; BLOCK_SIZE] = *b"ISM-mirror-key16";

/// IV baked into the mirror firmware
pub const DEFAULT_IV: [u8; BLOCK_SIZE] = *b"ISM-mirror-iv-16";

// ----------------------------------------------------------------------------
// Cipher Context
// ----------------------------------------------------------------------------

/// AES-128-CBC key and IV used for every command
///
/// There is no per-session key material; the same pair is used for the
/// lifetime of the process and must match the peripheral.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherContext {
    key: [u8; BLOCK_SIZE],
    iv: [u8; BLOCK_SIZE],
}

impl Default for CipherContext {
    fn default() -> Self {
        Self::new(DEFAULT_KEY, DEFAULT_IV)
    }
}

impl std::fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherContext").finish_non_exhaustive()
    }
}

impl CipherContext {
    pub fn new(key: [u8; BLOCK_SIZE], iv: [u8; BLOCK_SIZE]) -> Self {
        Self { key, iv }
    }

    /// Build a context from hex-encoded key and IV
    pub fn from_hex(key: &str, iv: &str) -> Result<Self> {
        Ok(Self::new(decode_block(key, "key")?, decode_block(iv, "iv")?))
    }

    /// Encrypt with PKCS#7 padding; output is rounded up to the next block
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Reverse [`encrypt`](Self::encrypt)
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(MirrorError::EncryptionFailed(format!(
                "ciphertext length {} is not a positive multiple of {}",
                ciphertext.len(),
                BLOCK_SIZE
            )));
        }
        Aes128CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|e| MirrorError::EncryptionFailed(format!("bad padding: {}", e)))
    }
}

fn decode_block(value: &str, what: &str) -> Result<[u8; BLOCK_SIZE]> {
    let bytes = hex::decode(value)
        .map_err(|e| MirrorError::Config(format!("cipher {} is not hex: {}", what, e)))?;
    bytes.as_slice().try_into().map_err(|_| {
        MirrorError::Config(format!(
            "cipher {} must be {} bytes, got {}",
            what,
            BLOCK_SIZE,
            bytes.len()
        ))
    })
}
