//! Authenticated encryption using AES-256-GCM and ChaCha20-Poly1305
//!
//! Nonces are never drawn at random here: callers build them from counters so
//! that a (key, nonce) pair is never reused.

use crate::{
    keys::{SymmetricKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE},
    CryptoError, Result,
};
use aes_gcm::{
    aead::{self, AeadInPlace, KeyInit},
    Aes256Gcm,
};
use chacha20poly1305::ChaCha20Poly1305;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// A nonce for AEAD encryption
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Build a nonce as `prefix (4 bytes BE) || counter (8 bytes BE)`
    pub fn from_counter(prefix: u32, counter: u64) -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        bytes[..4].copy_from_slice(&prefix.to_be_bytes());
        bytes[4..].copy_from_slice(&counter.to_be_bytes());
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::Serialization(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        crate::encoding::base64_serde::serialize(&self.bytes, s)
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let bytes = crate::encoding::base64_serde::deserialize(d)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Supported AEAD ciphers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AeadCipher {
    /// AES-256-GCM
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// ChaCha20-Poly1305
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl AeadCipher {
    /// Get the algorithm identifier string
    pub fn algorithm_id(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }

    /// Stable one-byte code bound into associated data
    pub fn code(&self) -> u8 {
        match self {
            Self::Aes256Gcm => 1,
            Self::ChaCha20Poly1305 => 2,
        }
    }
}

impl FromStr for AeadCipher {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes-256-gcm" | "aes256gcm" | "aes" => Ok(Self::Aes256Gcm),
            "chacha20-poly1305" | "chacha20poly1305" | "chacha" => Ok(Self::ChaCha20Poly1305),
            other => Err(format!("unknown cipher '{}'", other)),
        }
    }
}

/// AEAD encryption/decryption interface
pub struct Aead {
    cipher: AeadCipher,
    key: SymmetricKey,
}

impl Aead {
    /// Create a new AEAD instance with the given key and cipher
    pub fn new(key: &SymmetricKey, cipher: AeadCipher) -> Self {
        Self {
            cipher,
            key: key.clone(),
        }
    }

    /// Encrypt, returning the ciphertext and the tag separately
    pub fn encrypt_detached(
        &self,
        nonce: &Nonce,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_SIZE])> {
        let mut buffer = plaintext.to_vec();
        let tag = match self.cipher {
            AeadCipher::Aes256Gcm => {
                seal_detached::<Aes256Gcm>(self.key.as_bytes(), nonce, aad, &mut buffer)?
            }
            AeadCipher::ChaCha20Poly1305 => {
                seal_detached::<ChaCha20Poly1305>(self.key.as_bytes(), nonce, aad, &mut buffer)?
            }
        };
        Ok((buffer, tag))
    }

    /// Decrypt a detached ciphertext/tag pair
    ///
    /// Plaintext is only returned once the tag has verified.
    pub fn decrypt_detached(
        &self,
        nonce: &Nonce,
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        let mut buffer = ciphertext.to_vec();
        match self.cipher {
            AeadCipher::Aes256Gcm => {
                open_detached::<Aes256Gcm>(self.key.as_bytes(), nonce, aad, &mut buffer, tag)?
            }
            AeadCipher::ChaCha20Poly1305 => open_detached::<ChaCha20Poly1305>(
                self.key.as_bytes(),
                nonce,
                aad,
                &mut buffer,
                tag,
            )?,
        }
        Ok(buffer)
    }

    /// Encrypt data with the given nonce and associated data (tag appended)
    pub fn encrypt_with_aad(&self, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let (mut ciphertext, tag) = self.encrypt_detached(nonce, plaintext, aad)?;
        ciphertext.extend_from_slice(&tag);
        Ok(ciphertext)
    }

    /// Decrypt data produced by [`Aead::encrypt_with_aad`]
    pub fn decrypt_with_aad(
        &self,
        nonce: &Nonce,
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::Authentication(
                "ciphertext shorter than authentication tag".to_string(),
            ));
        }
        let (body, tag_bytes) = ciphertext.split_at(ciphertext.len() - TAG_SIZE);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(tag_bytes);
        self.decrypt_detached(nonce, body, &tag, aad)
    }
}

fn seal_detached<C>(
    key: &[u8; KEY_SIZE],
    nonce: &Nonce,
    aad: &[u8],
    buffer: &mut [u8],
) -> Result<[u8; TAG_SIZE]>
where
    C: KeyInit + AeadInPlace,
{
    let cipher = C::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let tag = cipher
        .encrypt_in_place_detached(aead::Nonce::<C>::from_slice(nonce.as_bytes()), aad, buffer)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let mut out = [0u8; TAG_SIZE];
    out.copy_from_slice(tag.as_slice());
    Ok(out)
}

fn open_detached<C>(
    key: &[u8; KEY_SIZE],
    nonce: &Nonce,
    aad: &[u8],
    buffer: &mut [u8],
    tag: &[u8; TAG_SIZE],
) -> Result<()>
where
    C: KeyInit + AeadInPlace,
{
    let cipher = C::new_from_slice(key).map_err(|e| CryptoError::Authentication(e.to_string()))?;
    cipher
        .decrypt_in_place_detached(
            aead::Nonce::<C>::from_slice(nonce.as_bytes()),
            aad,
            buffer,
            aead::Tag::<C>::from_slice(tag),
        )
        .map_err(|_| CryptoError::Authentication("AEAD tag mismatch".to_string()))
}
