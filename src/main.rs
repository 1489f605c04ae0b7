use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedcast::app::AppContext;
use feedcast::cli::{commands, Cli, Commands};
use feedcast::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // Initialize tracing
    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(file_layer)
        .init();

    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Run {
            once,
            no_initial_cycle,
        } => {
            commands::run(&ctx, once, no_initial_cycle).await?;
        }
        Commands::Auth { port, timeout } => {
            commands::auth(&ctx, port, timeout).await?;
        }
        Commands::Status => {
            commands::status(&ctx)?;
        }
        Commands::Stop => {
            commands::stop()?;
        }
    }

    Ok(())
}
