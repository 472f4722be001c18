//! `pqshare receive`: receiver side of the exchange, then decrypt the container

use super::{report_progress, LABEL_CONFIRMATION, LABEL_PUBLIC_KEY, LABEL_VERIFICATION};
use crate::{
    config::CliConfig,
    console::Console,
    error::{CliError, Result},
};
use pqshare_crypto::{task, EncryptedFile, ExchangeEvent, ExchangeSession, Role, TransferProgress};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{info, warn};

const FALLBACK_NAME: &str = "pqshare-received.bin";

/// Reduce a decrypted file name to a single safe path component
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Create `path` and write `data`, refusing to replace anything already there
///
/// Existence is checked by the open itself, so a file appearing between the
/// check and the write cannot be clobbered.
pub async fn write_new_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(CliError::InvalidInput(format!(
                "refusing to overwrite {}",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

/// Run the receiver flow and return the path of the decrypted file
pub async fn receive<R, W>(
    config: &CliConfig,
    container: &Path,
    out_dir: Option<&Path>,
    console: &mut Console<R, W>,
) -> Result<PathBuf>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut session, public_key) = ExchangeSession::start(Role::Receiver, config.encoding)?;
    console.show_blob(LABEL_PUBLIC_KEY, &public_key).await?;

    let ciphertext = console.prompt("Paste the sender's ciphertext:").await?;
    let tag = session
        .handle(ExchangeEvent::PeerCiphertext(ciphertext))?
        .ok_or_else(|| CliError::InvalidInput("no confirmation tag produced".to_string()))?;

    if let Some(code) = session.verification_code() {
        console.show_blob(LABEL_VERIFICATION, &code).await?;
    }
    console.show_blob(LABEL_CONFIRMATION, &tag).await?;
    let keys = session.into_session_keys()?;

    console
        .pause(&format!("Press Enter once {} has arrived.", container.display()))
        .await?;
    let json = tokio::fs::read_to_string(container).await?;
    let encrypted = EncryptedFile::from_json(&json)?;

    let (progress_tx, progress_rx) = watch::channel(TransferProgress::default());
    let decrypt =
        task::decrypt_file_with_progress(encrypted, keys.encryption_key().clone(), progress_tx);
    let (decrypted, reported) =
        tokio::join!(decrypt, report_progress(&mut *console, "Decrypting", progress_rx));
    let decrypted = decrypted.inspect_err(|e| warn!(error = %e, "container rejected"))?;
    reported?;

    let file_name = sanitize_file_name(&decrypted.name);
    if file_name != decrypted.name {
        warn!(original = %decrypted.name, sanitized = %file_name, "file name sanitized");
    }
    let dir = out_dir.unwrap_or(config.output_dir.as_path());
    tokio::fs::create_dir_all(dir).await?;
    let out_path = dir.join(&file_name);
    write_new_file(&out_path, &decrypted.data).await?;

    info!(size = decrypted.data.len(), path = %out_path.display(), "file decrypted");
    console
        .say(&format!("Decrypted file written to {}", out_path.display()))
        .await?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("report.pdf", "report.pdf")]
    #[case("../../etc/passwd", "passwd")]
    #[case("C:\\Users\\me\\notes.txt", "notes.txt")]
    #[case("..", FALLBACK_NAME)]
    #[case("dir/", FALLBACK_NAME)]
    #[case("", FALLBACK_NAME)]
    #[case("bad\u{0}name\n.txt", "badname.txt")]
    fn test_sanitize_file_name(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_file_name(input), expected);
    }

    #[tokio::test]
    async fn test_write_new_file_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");

        write_new_file(&path, b"first").await.unwrap();
        let err = write_new_file(&path, b"second").await.unwrap_err();
        assert!(matches!(err, CliError::InvalidInput(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_write_new_file_reports_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_new_file(&dir.path().join("missing/report.txt"), b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Io(_)));
    }
}
