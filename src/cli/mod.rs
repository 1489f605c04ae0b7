pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::publisher::oauth::DEFAULT_CALLBACK_TIMEOUT;

#[derive(Parser)]
#[command(name = "feedcast", version)]
#[command(about = "Republish new RSS/Atom entries to WordPress or Instagram", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/feedcast/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the feed and publish new entries
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Wait one interval before the first cycle
        #[arg(long, conflicts_with = "once")]
        no_initial_cycle: bool,
    },
    /// Authorize with WordPress.com and cache the access token
    Auth {
        /// Local port for the OAuth redirect (default: wordpress.redirect_port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Seconds to wait for the browser redirect
        #[arg(short, long, default_value_t = DEFAULT_CALLBACK_TIMEOUT.as_secs())]
        timeout: u64,
    },
    /// Show daemon, store and credential status
    Status,
    /// Stop the running daemon
    Stop,
}
