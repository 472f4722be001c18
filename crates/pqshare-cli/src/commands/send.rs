//! `pqshare send`: sender side of the exchange, then encrypt the file

use super::{report_progress, LABEL_CIPHERTEXT, LABEL_PUBLIC_KEY, LABEL_VERIFICATION};
use crate::{
    config::CliConfig,
    console::Console,
    error::{CliError, Result},
};
use pqshare_crypto::{task, ExchangeEvent, ExchangeSession, Role, TransferProgress};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, info};

/// Container path used when `--out` is not given
pub fn default_container_path(file: &Path) -> PathBuf {
    let mut name = file.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".pqs.json");
    file.with_file_name(name)
}

/// Run the sender flow and return the path of the written container
pub async fn send<R, W>(
    config: &CliConfig,
    file: &Path,
    out: Option<&Path>,
    console: &mut Console<R, W>,
) -> Result<PathBuf>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let data = tokio::fs::read(file).await?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            CliError::InvalidInput(format!("{} has no usable file name", file.display()))
        })?
        .to_string();
    debug!(size = data.len(), "file loaded");

    let (mut session, public_key) = ExchangeSession::start(Role::Sender, config.encoding)?;
    console.show_blob(LABEL_PUBLIC_KEY, &public_key).await?;

    let peer_key = console.prompt("Paste the receiver's public key:").await?;
    let ciphertext = session
        .handle(ExchangeEvent::PeerPublicKey(peer_key))?
        .ok_or_else(|| CliError::InvalidInput("no ciphertext produced".to_string()))?;
    console.show_blob(LABEL_CIPHERTEXT, &ciphertext).await?;

    if let Some(code) = session.verification_code() {
        console.show_blob(LABEL_VERIFICATION, &code).await?;
    }

    let answer = console
        .prompt("Type 'y' if the receiver sees the same code, or paste their confirmation tag:")
        .await?;
    let event = match answer.to_ascii_lowercase().as_str() {
        "y" | "yes" => ExchangeEvent::UserConfirmed,
        "n" | "no" => {
            session.abort();
            return Err(CliError::Cancelled);
        }
        _ => ExchangeEvent::PeerConfirmation(answer),
    };
    session.handle(event)?;
    let keys = session.into_session_keys()?;

    let (progress_tx, progress_rx) = watch::channel(TransferProgress::default());
    let encrypt = task::encrypt_file_with_progress(
        name,
        data,
        keys.encryption_key().clone(),
        config.file_options(),
        progress_tx,
    );
    let (encrypted, reported) =
        tokio::join!(encrypt, report_progress(&mut *console, "Encrypting", progress_rx));
    let encrypted = encrypted?;
    reported?;

    let out_path = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_container_path(file));
    tokio::fs::write(&out_path, encrypted.to_json()?).await?;

    info!(chunks = encrypted.chunk_count(), path = %out_path.display(), "container written");
    console
        .say(&format!("Encrypted container written to {}", out_path.display()))
        .await?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_container_path() {
        assert_eq!(
            default_container_path(Path::new("/tmp/report.pdf")),
            PathBuf::from("/tmp/report.pdf.pqs.json")
        );
        assert_eq!(
            default_container_path(Path::new("notes")),
            PathBuf::from("notes.pqs.json")
        );
    }
}
