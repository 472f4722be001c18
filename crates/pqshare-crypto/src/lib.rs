//! # pqshare Crypto
//!
//! Key establishment and file encryption for point-to-point file sharing that
//! stays confidential against classical and quantum adversaries.
//!
//! This crate provides:
//! - **Hybrid KEM**: Kyber768 (ML-KEM-768 parameter sizes) + X25519, combined
//!   with HKDF-SHA256
//! - **Session keys**: independent encryption/auth keys, key confirmation and
//!   a short verification code
//! - **Chunked file encryption**: AES-256-GCM or ChaCha20-Poly1305 per chunk
//!   with index-derived nonces and a BLAKE3 content hash
//! - **Manual exchange**: a state machine for swapping blobs by copy/paste
//!
//! The crate never touches the network. Moving the public key and ciphertext
//! between peers is the caller's job.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pqshare_crypto::{decapsulate, encapsulate, encrypt_file, decrypt_file, HybridKeypair};
//!
//! let receiver = HybridKeypair::generate()?;
//! let (ciphertext, sender_secret) = encapsulate(receiver.public_key())?;
//! let receiver_secret = decapsulate(ciphertext, &receiver)?;
//!
//! let keys = sender_secret.into_session_keys()?;
//! let file = encrypt_file("hello.txt", b"hello test", keys.encryption_key())?;
//!
//! let keys = receiver_secret.into_session_keys()?;
//! let plain = decrypt_file(&file, keys.encryption_key())?;
//! ```

pub mod chunked;
pub mod constant_time;
pub mod encoding;
pub mod error;
pub mod exchange;
pub mod hashing;
pub mod hybrid_kem;
pub mod kdf;
pub mod keys;
pub mod symmetric;
pub mod task;

pub use chunked::{
    chunk_count_for, decrypt_file, encrypt_file, encrypt_file_with, DecryptedFile,
    EncryptedChunk, EncryptedFile, FileDecryptor, FileEncryptionOptions, FileEncryptor,
    FileMetadata, TransferProgress,
};
pub use encoding::TextEncoding;
pub use error::{CryptoError, Result};
pub use exchange::{
    ExchangeError, ExchangeEvent, ExchangeSession, ExchangeState, ExchangeStep, PeerMaterial,
};
pub use hashing::{Blake3Hash, HashOutput, IncrementalHasher};
pub use hybrid_kem::{
    decapsulate, encapsulate, CipherSuite, HybridCiphertext, HybridKeypair, HybridPublicKey,
    SharedSecret,
};
pub use kdf::{Role, SessionKeys};
pub use keys::SymmetricKey;
pub use symmetric::{Aead, AeadCipher, Nonce};

pub use chunked::DEFAULT_CHUNK_SIZE;
