//! pqshare - post-quantum file sharing over a manual key exchange

use anyhow::Context;
use clap::{Parser, Subcommand};
use pqshare_cli::{commands, CliConfig, Console};
use pqshare_crypto::{AeadCipher, TextEncoding};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pqshare")]
#[command(about = "Share files under a hybrid Kyber768 + X25519 key exchange")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to ./pqshare.toml if present)
    #[arg(short, long, env = "PQSHARE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Text encoding for exchanged blobs (base64 or hex)
    #[arg(short, long, global = true)]
    encoding: Option<TextEncoding>,

    /// Enable debug logging
    #[arg(short, long, env = "PQSHARE_DEBUG", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sender side of the exchange and encrypt FILE
    Send {
        file: PathBuf,

        /// Where to write the container (default: <FILE>.pqs.json)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,

        /// AEAD cipher (aes-256-gcm or chacha20-poly1305)
        #[arg(long)]
        cipher: Option<AeadCipher>,
    },
    /// Run the receiver side of the exchange and decrypt CONTAINER
    Receive {
        container: PathBuf,

        /// Directory to write the decrypted file to
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Show a container's metadata without decrypting it
    Inspect {
        container: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logs go to stderr so stdout carries only prompts and blobs
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("pqshare_cli={},pqshare_crypto={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = CliConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }

    let mut console = Console::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());

    match args.command {
        Command::Send {
            file,
            out,
            chunk_size,
            cipher,
        } => {
            if let Some(chunk_size) = chunk_size {
                config.chunk_size = chunk_size;
            }
            if let Some(cipher) = cipher {
                config.cipher = cipher;
            }
            commands::send(&config, &file, out.as_deref(), &mut console)
                .await
                .with_context(|| format!("sending {}", file.display()))?;
        }
        Command::Receive { container, out_dir } => {
            commands::receive(&config, &container, out_dir.as_deref(), &mut console)
                .await
                .with_context(|| format!("receiving {}", container.display()))?;
        }
        Command::Inspect { container, json } => {
            let summary = commands::inspect(&container, json)
                .await
                .with_context(|| format!("inspecting {}", container.display()))?;
            console.say(&summary).await?;
        }
    }

    Ok(())
}
