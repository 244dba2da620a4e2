//! CLI entry point for fedauth.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sign in to a Mastodon-compatible instance from the terminal.
#[derive(Parser, Debug)]
#[command(name = "fedauth", version, about = "Fediverse OAuth sign-in")]
pub struct Cli {
    /// Directory holding config.toml, the session and pending sign-ins
    #[arg(long, global = true, env = "FEDAUTH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a sign-in and (by default) wait for the pasted redirect URL
    Login(LoginArgs),
    /// Finish a sign-in started with `login --no-wait`
    Callback(CallbackArgs),
    /// Check the stored session with the instance
    Status,
    /// Show the stored profile without contacting the instance
    Whoami,
    /// Forget the stored credential and profile
    Logout,
}

/// Arguments for `fedauth login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Instance host, e.g. mastodon.social
    pub instance: String,
    /// Account handle: alice, @alice or @alice@mastodon.social
    pub handle: String,
    /// Print the URL and session key, then exit
    #[arg(long)]
    pub no_wait: bool,
}

/// Arguments for `fedauth callback`.
#[derive(Parser, Debug)]
pub struct CallbackArgs {
    /// The full URL the instance redirected the browser to
    pub redirect_url: String,
    /// Session key printed by `login --no-wait`
    #[arg(long)]
    pub session: String,
}
