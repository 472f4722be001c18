//! Subcommand implementations

use crate::{console::Console, error::Result};
use pqshare_crypto::TransferProgress;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::watch;

pub mod inspect;
pub mod receive;
pub mod send;

pub use inspect::inspect;
pub use receive::receive;
pub use send::send;

/// Labels printed before each blob
pub const LABEL_PUBLIC_KEY: &str = "Your public key";
pub const LABEL_CIPHERTEXT: &str = "Ciphertext for the receiver";
pub const LABEL_CONFIRMATION: &str = "Confirmation tag for the sender";
pub const LABEL_VERIFICATION: &str = "Verification code";

/// Print progress in 10% steps until the producing task drops its sender
pub async fn report_progress<R, W>(
    console: &mut Console<R, W>,
    label: &str,
    mut progress: watch::Receiver<TransferProgress>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut last_step = None;
    while progress.changed().await.is_ok() {
        let current = *progress.borrow_and_update();
        let step = (current.percentage() / 10.0).floor() as u64;
        if last_step != Some(step) {
            console.say(&progress_line(label, &current)).await?;
            last_step = Some(step);
        }
    }

    // The sender may close right after its last update
    let current = *progress.borrow();
    if current.is_complete() && last_step != Some(10) {
        console.say(&progress_line(label, &current)).await?;
    }
    Ok(())
}

fn progress_line(label: &str, progress: &TransferProgress) -> String {
    format!(
        "{}: {:>3.0}% ({}/{} chunks)",
        label,
        progress.percentage(),
        progress.chunks_processed,
        progress.total_chunks
    )
}
