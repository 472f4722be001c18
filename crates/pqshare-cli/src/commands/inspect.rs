//! `pqshare inspect`: print a container's non-secret metadata

use crate::error::Result;
use pqshare_crypto::{AeadCipher, CipherSuite, EncryptedFile};
use serde::Serialize;
use std::path::Path;

/// What a container reveals without any key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub format: String,
    pub suite: CipherSuite,
    pub cipher: AeadCipher,
    pub file_id: String,
    pub chunk_size: u32,
    pub chunk_count: u64,
    pub original_size: u64,
    pub file_hash: String,
}

impl From<&EncryptedFile> for ContainerSummary {
    fn from(file: &EncryptedFile) -> Self {
        let m = &file.metadata;
        Self {
            format: m.format.clone(),
            suite: m.suite,
            cipher: m.cipher,
            file_id: m.file_id.iter().map(|b| format!("{:02x}", b)).collect(),
            chunk_size: m.chunk_size,
            chunk_count: m.chunk_count,
            original_size: m.original_size,
            file_hash: m.file_hash.to_hex(),
        }
    }
}

impl std::fmt::Display for ContainerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "format:        {}", self.format)?;
        writeln!(f, "suite:         {}", self.suite)?;
        writeln!(f, "cipher:        {}", self.cipher.algorithm_id())?;
        writeln!(f, "file id:       {}", self.file_id)?;
        writeln!(f, "chunk size:    {}", self.chunk_size)?;
        writeln!(f, "chunks:        {}", self.chunk_count)?;
        writeln!(f, "size:          {}", self.original_size)?;
        write!(f, "blake3:        {}", self.file_hash)
    }
}

/// Load a container and summarize it, as text or JSON
pub async fn inspect(container: &Path, json: bool) -> Result<String> {
    let text = tokio::fs::read_to_string(container).await?;
    let file = EncryptedFile::from_json(&text)?;
    let summary = ContainerSummary::from(&file);

    if json {
        Ok(serde_json::to_string_pretty(&summary).map_err(pqshare_crypto::CryptoError::from)?)
    } else {
        Ok(summary.to_string())
    }
}
