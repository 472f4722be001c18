//! Chunked file encryption
//!
//! A file is split into fixed-size chunks, each sealed with AEAD under a
//! per-file key. Nonces come from the chunk index, never from the RNG, so
//! chunks can be sealed and opened in any order (or in parallel) and still
//! produce the same container.
//!
//! ## Layout
//!
//! - `file_key = HKDF-SHA256(ikm = encryption_key, salt = file_id, info = "pqshare/v1/file-key")`
//! - chunk nonce: `0x00000000 || u64_be(index)`
//! - name nonce: `0xFFFFFFFF || 0^8`
//! - chunk AAD: `"pqshare/v1/chunk" || file_id || u64_be(index) || final_flag`
//! - name AAD: every metadata field, so the sealed name authenticates the record
//!
//! The final flag is set only on the last chunk; dropping trailing chunks
//! therefore fails authentication.

use crate::{
    constant_time::ct_eq,
    encoding::{base64_array, base64_serde},
    hashing::{Blake3Hash, IncrementalHasher},
    hybrid_kem::CipherSuite,
    keys::{SymmetricKey, KEY_SIZE, TAG_SIZE},
    symmetric::{Aead, AeadCipher, Nonce},
    CryptoError, Result,
};
use bytes::Bytes;
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

/// Format identifier stored in every container
pub const FORMAT_TAG: &str = "pqshare-chunked-v1";

/// Default chunk size: 256 KB
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Minimum chunk size: 16 KB
pub const MIN_CHUNK_SIZE: usize = 16 * 1024;

/// Maximum chunk size: 16 MB
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Size of the random per-file identifier
pub const FILE_ID_SIZE: usize = 16;

const CHUNK_NONCE_PREFIX: u32 = 0;
const NAME_NONCE_PREFIX: u32 = 0xFFFF_FFFF;

const FILE_KEY_INFO: &[u8] = b"pqshare/v1/file-key";
const CHUNK_AAD_LABEL: &[u8] = b"pqshare/v1/chunk";
const NAME_AAD_LABEL: &[u8] = b"pqshare/v1/name";

/// Tunables for encrypting one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEncryptionOptions {
    /// Requested chunk size, clamped to `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`
    pub chunk_size: usize,
    pub cipher: AeadCipher,
}

impl Default for FileEncryptionOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            cipher: AeadCipher::default(),
        }
    }
}

/// One sealed chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedChunk {
    /// Chunk index (0-based)
    pub index: u64,
    /// Nonce used for this chunk; always the one derived from `index`
    pub nonce: Nonce,
    /// Encrypted chunk data, same length as the plaintext
    #[serde(with = "base64_serde")]
    pub ciphertext: Vec<u8>,
    /// Detached authentication tag
    #[serde(with = "base64_array")]
    pub tag: [u8; TAG_SIZE],
}

/// Per-file metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Format version identifier
    pub format: String,
    /// Key-establishment suite the session key came from
    pub suite: CipherSuite,
    pub cipher: AeadCipher,
    #[serde(with = "base64_array")]
    pub file_id: [u8; FILE_ID_SIZE],
    /// Size of each chunk in bytes (except possibly the last)
    pub chunk_size: u32,
    pub chunk_count: u64,
    pub original_size: u64,
    /// BLAKE3 hash of the plaintext
    pub file_hash: Blake3Hash,
    /// File name sealed under the name nonce, tag appended
    #[serde(with = "base64_serde")]
    pub encrypted_name: Vec<u8>,
}

impl FileMetadata {
    /// Reject records no encryptor could have produced
    fn validate(&self) -> Result<()> {
        if self.format != FORMAT_TAG {
            return Err(CryptoError::Serialization(format!(
                "unsupported format '{}', expected '{}'",
                self.format, FORMAT_TAG
            )));
        }
        let chunk_size = self.chunk_size as usize;
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(CryptoError::Serialization(format!(
                "chunk size {} outside [{}, {}]",
                chunk_size, MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        let expected = chunk_count_for(self.original_size, chunk_size);
        if self.chunk_count != expected {
            return Err(CryptoError::Serialization(format!(
                "{} bytes at chunk size {} needs {} chunks, metadata says {}",
                self.original_size, chunk_size, expected, self.chunk_count
            )));
        }
        Ok(())
    }

    /// Plaintext length of the chunk at `index`
    fn chunk_len(&self, index: u64) -> usize {
        let chunk_size = self.chunk_size as u64;
        if index + 1 == self.chunk_count {
            (self.original_size - index * chunk_size) as usize
        } else {
            chunk_size as usize
        }
    }

    fn name_aad(&self) -> Vec<u8> {
        let mut aad = Vec::with_capacity(NAME_AAD_LABEL.len() + FILE_ID_SIZE + 64);
        aad.extend_from_slice(NAME_AAD_LABEL);
        aad.extend_from_slice(&self.file_id);
        aad.extend_from_slice(self.suite.id().as_bytes());
        aad.push(self.cipher.code());
        aad.extend_from_slice(&self.chunk_size.to_be_bytes());
        aad.extend_from_slice(&self.chunk_count.to_be_bytes());
        aad.extend_from_slice(&self.original_size.to_be_bytes());
        aad.extend_from_slice(self.file_hash.as_bytes());
        aad
    }
}

/// An encrypted file: metadata plus its ordered chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedFile {
    pub metadata: FileMetadata,
    pub chunks: Vec<EncryptedChunk>,
}

impl EncryptedFile {
    /// Serialize the container as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a JSON container
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Number of chunks recorded in the metadata
    pub fn chunk_count(&self) -> u64 {
        self.metadata.chunk_count
    }
}

/// Result of a successful decryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFile {
    pub name: String,
    pub data: Bytes,
}

/// How far an encryption or decryption has got
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_processed: u64,
    pub total_bytes: u64,
    pub chunks_processed: u64,
    pub total_chunks: u64,
}

impl TransferProgress {
    /// Progress for a file of `total_bytes`, nothing processed yet
    pub fn new(total_bytes: u64, chunk_size: usize) -> Self {
        Self {
            total_bytes,
            total_chunks: chunk_count_for(total_bytes, chunk_size),
            ..Default::default()
        }
    }

    /// Completion percentage; an empty file counts as done
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.bytes_processed as f64 / self.total_bytes as f64) * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_processed >= self.total_bytes && self.chunks_processed >= self.total_chunks
    }
}

/// Number of chunks a file of `size` bytes occupies
pub fn chunk_count_for(size: u64, chunk_size: usize) -> u64 {
    size.div_ceil(chunk_size.max(1) as u64)
}

fn chunk_nonce(index: u64) -> Nonce {
    Nonce::from_counter(CHUNK_NONCE_PREFIX, index)
}

fn name_nonce() -> Nonce {
    Nonce::from_counter(NAME_NONCE_PREFIX, 0)
}

fn chunk_aad(file_id: &[u8; FILE_ID_SIZE], index: u64, is_final: bool) -> Vec<u8> {
    let mut aad = Vec::with_capacity(CHUNK_AAD_LABEL.len() + FILE_ID_SIZE + 9);
    aad.extend_from_slice(CHUNK_AAD_LABEL);
    aad.extend_from_slice(file_id);
    aad.extend_from_slice(&index.to_be_bytes());
    aad.push(u8::from(is_final));
    aad
}

fn file_key(key: &SymmetricKey, file_id: &[u8; FILE_ID_SIZE]) -> Result<SymmetricKey> {
    let hk = Hkdf::<Sha256>::new(Some(file_id), key.as_bytes());
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(FILE_KEY_INFO, okm.as_mut_slice())
        .map_err(|e| CryptoError::Encryption(format!("file key expansion: {}", e)))?;
    Ok(SymmetricKey::from_array(*okm))
}

/// Streaming encryptor for one file
///
/// Feed data with [`FileEncryptor::update`]; complete chunks are sealed as
/// soon as it is known they are not the last one. [`FileEncryptor::finalize`]
/// seals the final chunk and builds the metadata.
pub struct FileEncryptor {
    aead: Aead,
    cipher: AeadCipher,
    file_id: [u8; FILE_ID_SIZE],
    chunk_size: usize,
    hasher: IncrementalHasher,
    buffer: Zeroizing<Vec<u8>>,
    next_index: u64,
}

impl FileEncryptor {
    /// Create an encryptor under the session encryption key
    pub fn new(key: &SymmetricKey, options: &FileEncryptionOptions) -> Result<Self> {
        let mut file_id = [0u8; FILE_ID_SIZE];
        getrandom::getrandom(&mut file_id)
            .map_err(|e| CryptoError::Generation(format!("file id: {}", e)))?;

        let chunk_size = options.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        let file_key = file_key(key, &file_id)?;

        Ok(Self {
            aead: Aead::new(&file_key, options.cipher),
            cipher: options.cipher,
            file_id,
            chunk_size,
            hasher: IncrementalHasher::new(),
            buffer: Zeroizing::new(Vec::with_capacity(chunk_size)),
            next_index: 0,
        })
    }

    /// Feed data into the encryptor
    ///
    /// Returns any chunks that are complete and known not to be the last.
    pub fn update(&mut self, data: &[u8]) -> Result<Vec<EncryptedChunk>> {
        self.hasher.update(data);
        self.buffer.extend_from_slice(data);

        let mut ready = Vec::new();
        // A full chunk is held back until more data shows it is not final
        while self.buffer.len() > self.chunk_size {
            let rest = self.buffer.split_off(self.chunk_size);
            let full = std::mem::replace(&mut *self.buffer, rest);
            let full = Zeroizing::new(full);
            ready.push(self.seal_chunk(self.next_index, &full, false)?);
            self.next_index += 1;
        }
        Ok(ready)
    }

    /// Seal the last chunk (if any) and produce the metadata record
    pub fn finalize(mut self, name: &str) -> Result<(Option<EncryptedChunk>, FileMetadata)> {
        let final_chunk = if self.buffer.is_empty() {
            None
        } else {
            let chunk = self.seal_chunk(self.next_index, &self.buffer, true)?;
            self.next_index += 1;
            Some(chunk)
        };

        let mut metadata = FileMetadata {
            format: FORMAT_TAG.to_string(),
            suite: CipherSuite::MlKem768X25519,
            cipher: self.cipher,
            file_id: self.file_id,
            chunk_size: self.chunk_size as u32,
            chunk_count: self.next_index,
            original_size: self.hasher.bytes_processed(),
            file_hash: self.hasher.finalize(),
            encrypted_name: Vec::new(),
        };
        metadata.encrypted_name =
            self.aead
                .encrypt_with_aad(&name_nonce(), name.as_bytes(), &metadata.name_aad())?;

        debug!(
            chunks = metadata.chunk_count,
            size = metadata.original_size,
            "file encryption finalized"
        );
        Ok((final_chunk, metadata))
    }

    /// Seal one chunk; depends only on its index and position
    fn seal_chunk(&self, index: u64, plaintext: &[u8], is_final: bool) -> Result<EncryptedChunk> {
        let nonce = chunk_nonce(index);
        let aad = chunk_aad(&self.file_id, index, is_final);
        let (ciphertext, tag) = self.aead.encrypt_detached(&nonce, plaintext, &aad)?;
        Ok(EncryptedChunk {
            index,
            nonce,
            ciphertext,
            tag,
        })
    }

    /// Get total bytes processed
    pub fn bytes_processed(&self) -> u64 {
        self.hasher.bytes_processed()
    }

    /// Chunks sealed so far
    pub fn chunks_processed(&self) -> u64 {
        self.next_index
    }

    /// Effective chunk size after clamping
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Decryptor for one file
///
/// Chunks must arrive in order. No plaintext is handed out until
/// [`FileDecryptor::finalize`] has checked the chunk count, size and hash.
pub struct FileDecryptor {
    aead: Aead,
    metadata: FileMetadata,
    name: String,
    hasher: IncrementalHasher,
    plaintext: Zeroizing<Vec<u8>>,
    next_index: u64,
}

impl FileDecryptor {
    /// Validate and authenticate the metadata record
    pub fn new(metadata: FileMetadata, key: &SymmetricKey) -> Result<Self> {
        metadata.validate()?;

        let file_key = file_key(key, &metadata.file_id)?;
        let aead = Aead::new(&file_key, metadata.cipher);
        let name_bytes = aead
            .decrypt_with_aad(&name_nonce(), &metadata.encrypted_name, &metadata.name_aad())
            .inspect_err(|_| warn!("file metadata failed authentication"))?;
        let name = String::from_utf8(name_bytes)
            .map_err(|_| CryptoError::Serialization("file name is not UTF-8".to_string()))?;

        let capacity = metadata.original_size.min(MAX_CHUNK_SIZE as u64) as usize;
        Ok(Self {
            aead,
            metadata,
            name,
            hasher: IncrementalHasher::new(),
            plaintext: Zeroizing::new(Vec::with_capacity(capacity)),
            next_index: 0,
        })
    }

    /// Decrypt the next chunk
    pub fn decrypt_chunk(&mut self, chunk: &EncryptedChunk) -> Result<()> {
        if chunk.index != self.next_index {
            return Err(CryptoError::Serialization(format!(
                "expected chunk {}, got {}",
                self.next_index, chunk.index
            )));
        }
        let plaintext = self.open_chunk(chunk)?;
        self.absorb(&plaintext);
        Ok(())
    }

    /// Verify and decrypt a chunk without touching decryptor state
    fn open_chunk(&self, chunk: &EncryptedChunk) -> Result<Zeroizing<Vec<u8>>> {
        if chunk.index >= self.metadata.chunk_count {
            return Err(CryptoError::Serialization(format!(
                "chunk {} beyond recorded count {}",
                chunk.index, self.metadata.chunk_count
            )));
        }
        let expected_len = self.metadata.chunk_len(chunk.index);
        if chunk.ciphertext.len() != expected_len {
            return Err(CryptoError::Serialization(format!(
                "chunk {} is {} bytes, expected {}",
                chunk.index,
                chunk.ciphertext.len(),
                expected_len
            )));
        }

        let nonce = chunk_nonce(chunk.index);
        if !ct_eq(nonce.as_bytes(), chunk.nonce.as_bytes()) {
            return Err(CryptoError::Authentication(format!(
                "chunk {} nonce does not match its index",
                chunk.index
            )));
        }

        let is_final = chunk.index + 1 == self.metadata.chunk_count;
        let aad = chunk_aad(&self.metadata.file_id, chunk.index, is_final);
        let plaintext = self
            .aead
            .decrypt_detached(&nonce, &chunk.ciphertext, &chunk.tag, &aad)
            .inspect_err(|_| warn!(index = chunk.index, "chunk failed authentication"))?;
        Ok(Zeroizing::new(plaintext))
    }

    fn absorb(&mut self, plaintext: &[u8]) {
        self.hasher.update(plaintext);
        self.plaintext.extend_from_slice(plaintext);
        self.next_index += 1;
    }

    /// Check completeness and integrity, then release the plaintext
    pub fn finalize(mut self) -> Result<DecryptedFile> {
        if self.next_index != self.metadata.chunk_count {
            return Err(CryptoError::Serialization(format!(
                "missing chunks: expected {}, got {}",
                self.metadata.chunk_count, self.next_index
            )));
        }
        if self.hasher.bytes_processed() != self.metadata.original_size {
            return Err(CryptoError::Integrity {
                expected: format!("{} bytes", self.metadata.original_size),
                actual: format!("{} bytes", self.hasher.bytes_processed()),
            });
        }

        let actual = self.hasher.finalize();
        if !actual.ct_matches(&self.metadata.file_hash) {
            warn!("decrypted content hash mismatch");
            return Err(CryptoError::Integrity {
                expected: self.metadata.file_hash.to_hex(),
                actual: actual.to_hex(),
            });
        }

        Ok(DecryptedFile {
            name: std::mem::take(&mut self.name),
            data: Bytes::from(std::mem::take(&mut *self.plaintext)),
        })
    }

    /// Decrypted file name (authenticated in [`FileDecryptor::new`])
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Plaintext bytes authenticated so far
    pub fn bytes_processed(&self) -> u64 {
        self.hasher.bytes_processed()
    }

    /// Chunks authenticated so far
    pub fn chunks_processed(&self) -> u64 {
        self.next_index
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress {
            bytes_processed: self.bytes_processed(),
            total_bytes: self.metadata.original_size,
            chunks_processed: self.next_index,
            total_chunks: self.metadata.chunk_count,
        }
    }
}

/// Encrypt a whole file with default options
pub fn encrypt_file(name: &str, data: &[u8], key: &SymmetricKey) -> Result<EncryptedFile> {
    encrypt_file_with(name, data, key, &FileEncryptionOptions::default())
}

/// Encrypt a whole file
#[instrument(skip_all, fields(size = data.len()))]
pub fn encrypt_file_with(
    name: &str,
    data: &[u8],
    key: &SymmetricKey,
    options: &FileEncryptionOptions,
) -> Result<EncryptedFile> {
    let mut encryptor = FileEncryptor::new(key, options)?;
    let chunks = seal_all(&mut encryptor, data)?;
    let (final_chunk, metadata) = encryptor.finalize(name)?;

    let mut chunks = chunks;
    chunks.extend(final_chunk);
    Ok(EncryptedFile { metadata, chunks })
}

#[cfg(not(feature = "parallel"))]
fn seal_all(encryptor: &mut FileEncryptor, data: &[u8]) -> Result<Vec<EncryptedChunk>> {
    encryptor.update(data)
}

#[cfg(feature = "parallel")]
fn seal_all(encryptor: &mut FileEncryptor, data: &[u8]) -> Result<Vec<EncryptedChunk>> {
    use rayon::prelude::*;

    let count = chunk_count_for(data.len() as u64, encryptor.chunk_size);
    let sealer = &*encryptor;
    let chunks = data
        .par_chunks(encryptor.chunk_size)
        .enumerate()
        .map(|(i, plaintext)| {
            let index = i as u64;
            sealer.seal_chunk(index, plaintext, index + 1 == count)
        })
        .collect::<Result<Vec<_>>>()?;

    encryptor.hasher.update(data);
    encryptor.next_index = count;
    Ok(chunks)
}

/// Decrypt a whole file (all-or-nothing)
#[instrument(skip_all, fields(chunks = file.chunks.len()))]
pub fn decrypt_file(file: &EncryptedFile, key: &SymmetricKey) -> Result<DecryptedFile> {
    if file.chunks.len() as u64 != file.metadata.chunk_count {
        return Err(CryptoError::Serialization(format!(
            "container holds {} chunks, metadata says {}",
            file.chunks.len(),
            file.metadata.chunk_count
        )));
    }

    let mut decryptor = FileDecryptor::new(file.metadata.clone(), key)?;
    open_all(&mut decryptor, &file.chunks)?;
    let decrypted = decryptor.finalize()?;

    debug!(size = decrypted.data.len(), "file decrypted");
    Ok(decrypted)
}

#[cfg(not(feature = "parallel"))]
fn open_all(decryptor: &mut FileDecryptor, chunks: &[EncryptedChunk]) -> Result<()> {
    for chunk in chunks {
        decryptor.decrypt_chunk(chunk)?;
    }
    Ok(())
}

#[cfg(feature = "parallel")]
fn open_all(decryptor: &mut FileDecryptor, chunks: &[EncryptedChunk]) -> Result<()> {
    use rayon::prelude::*;

    let opener = &*decryptor;
    let opened = chunks
        .par_iter()
        .enumerate()
        .map(|(i, chunk)| {
            if chunk.index != i as u64 {
                return Err(CryptoError::Serialization(format!(
                    "expected chunk {}, got {}",
                    i, chunk.index
                )));
            }
            opener.open_chunk(chunk)
        })
        .collect::<Result<Vec<_>>>()?;

    for plaintext in &opened {
        decryptor.absorb(plaintext);
    }
    Ok(())
}
