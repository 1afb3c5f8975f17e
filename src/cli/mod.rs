//! CLI entry point for inspecting and driving a persisted session.

pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ComicCoin session CLI
#[derive(Parser, Debug)]
#[command(name = "comiccoin-auth", version, about = "Inspect and manage a ComicCoin session")]
pub struct Cli {
    /// Storage directory (defaults to COMICCOIN_AUTH_STORAGE_DIR or ~/.comiccoin)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Refresh endpoint URL (defaults to COMICCOIN_AUTH_REFRESH_URL)
    #[arg(long, global = true)]
    pub refresh_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Session subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the stored session
    Status,
    /// Store a token pair obtained elsewhere
    Login(LoginArgs),
    /// Exchange the refresh token for a new pair
    Refresh,
    /// Print a valid access token, refreshing if it is about to expire
    Token,
    /// Remove the stored session
    Logout,
}

/// Arguments for `comiccoin-auth login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    #[arg(long)]
    pub access_token: String,

    #[arg(long)]
    pub refresh_token: String,

    /// Access token expiry, epoch seconds or milliseconds
    #[arg(long)]
    pub expires_at: i64,
}
