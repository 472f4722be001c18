//! Terminal I/O for the manual exchange
//!
//! Blobs are printed on their own line right after a `label:` line so they
//! can be copied whole. Input blobs are read as the next non-empty line.

use crate::error::{CliError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print a line of text
    pub async fn say(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }

    /// Print a labelled blob for the user to copy
    pub async fn show_blob(&mut self, label: &str, blob: &str) -> Result<()> {
        self.say(&format!("{}:", label)).await?;
        self.say(blob).await?;
        self.say("").await
    }

    /// Prompt and return the next non-empty line, trimmed
    pub async fn prompt(&mut self, question: &str) -> Result<String> {
        self.say(question).await?;
        let mut line = String::new();
        loop {
            line.clear();
            if self.input.read_line(&mut line).await? == 0 {
                return Err(CliError::InvalidInput(
                    "input closed before an answer was given".to_string(),
                ));
            }
            let answer = line.trim();
            if !answer.is_empty() {
                return Ok(answer.to_string());
            }
        }
    }

    /// Wait for the user to press Enter
    pub async fn pause(&mut self, message: &str) -> Result<()> {
        self.say(message).await?;
        let mut line = String::new();
        self.input.read_line(&mut line).await?;
        Ok(())
    }
}
