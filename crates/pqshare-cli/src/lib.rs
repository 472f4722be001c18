//! # pqshare CLI
//!
//! Command-line shell around `pqshare-crypto`. Two people run `send` and
//! `receive`, swap the printed blobs by any channel they like, compare the
//! verification code and move the encrypted container however they want.
//! The CLI never opens a network socket.

pub mod commands;
pub mod config;
pub mod console;
pub mod error;

pub use config::CliConfig;
pub use console::Console;
pub use error::{CliError, Result};
