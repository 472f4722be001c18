//! CLI configuration
//!
//! Sources, lowest precedence first: built-in defaults, `pqshare.toml` in the
//! working directory (or the file given with `--config`), `PQSHARE_*`
//! environment variables. Command-line flags are applied on top by `main`.

use crate::error::Result;
use pqshare_crypto::{AeadCipher, FileEncryptionOptions, TextEncoding, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// pqshare CLI configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Text encoding for the public key, ciphertext and confirmation tag
    pub encoding: TextEncoding,
    /// Chunk size for file encryption (clamped by the crypto crate)
    pub chunk_size: usize,
    /// AEAD cipher for file chunks
    pub cipher: AeadCipher,
    /// Directory decrypted files are written to
    pub output_dir: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Base64,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cipher: AeadCipher::Aes256Gcm,
            output_dir: PathBuf::from("."),
        }
    }
}

impl CliConfig {
    /// Load configuration from the optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("pqshare").required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("PQSHARE"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Options for the file encryptor
    pub fn file_options(&self) -> FileEncryptionOptions {
        FileEncryptionOptions {
            chunk_size: self.chunk_size,
            cipher: self.cipher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.encoding, TextEncoding::Base64);
        assert_eq!(config.chunk_size, 256 * 1024);
        assert_eq!(config.file_options().cipher, AeadCipher::Aes256Gcm);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            concat!(
                "encoding = \"hex\"\n",
                "chunk_size = 65536\n",
                "cipher = \"chacha20-poly1305\"\n",
                "output_dir = \"/tmp/inbox\"",
            )
        )
        .unwrap();

        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.encoding, TextEncoding::Hex);
        assert_eq!(config.chunk_size, 65536);
        assert_eq!(config.cipher, AeadCipher::ChaCha20Poly1305);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/inbox"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "encoding = \"hex\"").unwrap();

        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.encoding, TextEncoding::Hex);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = CliConfig::load(Some(Path::new("/definitely/not/here/pqshare.toml")));
        assert!(result.is_err());
    }
}
