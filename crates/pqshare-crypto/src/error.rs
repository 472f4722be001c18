//! Error types for the pqshare-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during key establishment and file encryption.
///
/// Messages describe what failed, never the key material involved.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Randomness or a primitive's key generation failed
    #[error("key generation failed: {0}")]
    Generation(String),

    /// Peer public key is malformed or encapsulation failed
    #[error("encapsulation failed: {0}")]
    Encapsulation(String),

    /// Ciphertext is structurally invalid for decapsulation
    #[error("decapsulation failed: {0}")]
    Decapsulation(String),

    /// An AEAD tag or confirmation tag did not verify
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Decrypted content does not match the recorded hash or size
    #[error("integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// A serialized blob has the wrong length or shape
    #[error("serialization error: {0}")]
    Serialization(String),

    /// AEAD encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The exchange was aborted and cannot be resumed
    #[error("exchange aborted")]
    ExchangeAborted,

    /// An event arrived that the current state does not accept
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Hex decode error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// JSON container error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CryptoError {
    /// Whether this error came from a failed authentication tag
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Whether this error came from a malformed blob
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            Self::Serialization(_) | Self::Base64Decode(_) | Self::HexDecode(_) | Self::Json(_)
        )
    }
}
