//! Async entry points
//!
//! All crypto in this crate is synchronous and CPU-bound. These helpers move
//! it off the async executor, or feed it from an `AsyncRead`.

use crate::{
    chunked::{
        DecryptedFile, EncryptedFile, FileDecryptor, FileEncryptionOptions, FileEncryptor,
        TransferProgress,
    },
    keys::SymmetricKey,
    CryptoError, Result,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::debug;

/// Run a CPU-bound closure on tokio's blocking pool
pub async fn spawn_crypto<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CryptoError::Io(e.into()))?
}

/// Encrypt on the blocking pool, publishing progress after every chunk
///
/// Progress goes out on a watch channel, so a slow reader only ever sees the
/// latest snapshot. A dropped receiver does not stop the encryption.
pub async fn encrypt_file_with_progress(
    name: String,
    data: Vec<u8>,
    key: SymmetricKey,
    options: FileEncryptionOptions,
    progress: watch::Sender<TransferProgress>,
) -> Result<EncryptedFile> {
    spawn_crypto(move || {
        let mut encryptor = FileEncryptor::new(&key, &options)?;
        let chunk_size = encryptor.chunk_size();
        let mut current = TransferProgress::new(data.len() as u64, chunk_size);
        progress.send_replace(current);

        let mut chunks = Vec::with_capacity(current.total_chunks as usize);
        for piece in data.chunks(chunk_size) {
            chunks.extend(encryptor.update(piece)?);
            current.bytes_processed = encryptor.bytes_processed();
            current.chunks_processed = encryptor.chunks_processed();
            progress.send_replace(current);
        }

        let (final_chunk, metadata) = encryptor.finalize(&name)?;
        chunks.extend(final_chunk);
        current.chunks_processed = metadata.chunk_count;
        progress.send_replace(current);
        Ok(EncryptedFile { metadata, chunks })
    })
    .await
}

/// Decrypt on the blocking pool, publishing progress after every chunk
pub async fn decrypt_file_with_progress(
    file: EncryptedFile,
    key: SymmetricKey,
    progress: watch::Sender<TransferProgress>,
) -> Result<DecryptedFile> {
    spawn_crypto(move || {
        if file.chunks.len() as u64 != file.metadata.chunk_count {
            return Err(CryptoError::Serialization(format!(
                "container holds {} chunks, metadata says {}",
                file.chunks.len(),
                file.metadata.chunk_count
            )));
        }

        let EncryptedFile { metadata, chunks } = file;
        let mut decryptor = FileDecryptor::new(metadata, &key)?;
        progress.send_replace(decryptor.progress());
        for chunk in &chunks {
            decryptor.decrypt_chunk(chunk)?;
            progress.send_replace(decryptor.progress());
        }
        decryptor.finalize()
    })
    .await
}

/// Encrypt everything an async reader yields
///
/// Reads in chunk-size increments, so memory stays bounded by the chunk size
/// plus the sealed output.
pub async fn encrypt_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    name: &str,
    key: &SymmetricKey,
    options: &FileEncryptionOptions,
) -> Result<EncryptedFile> {
    let mut encryptor = FileEncryptor::new(key, options)?;
    let mut buffer = vec![0u8; encryptor.chunk_size()];
    let mut chunks = Vec::new();

    loop {
        let mut bytes_read = 0;

        // Fill the buffer up to chunk_size
        while bytes_read < buffer.len() {
            match reader.read(&mut buffer[bytes_read..]).await? {
                0 => break, // EOF
                n => bytes_read += n,
            }
        }

        if bytes_read == 0 {
            break;
        }
        chunks.extend(encryptor.update(&buffer[..bytes_read])?);
        if bytes_read < buffer.len() {
            break;
        }
    }

    let (final_chunk, metadata) = encryptor.finalize(name)?;
    chunks.extend(final_chunk);
    debug!(chunks = chunks.len(), "reader encrypted");
    Ok(EncryptedFile { metadata, chunks })
}
