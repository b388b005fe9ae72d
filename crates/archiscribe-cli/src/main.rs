//! archiscribe - keeps a year-partitioned cache of Fraktur OCR lines stocked
//!
//! Samples German-language items from the Internet Archive, keeps the ones
//! whose OCR detected Fraktur, and stores line crops per publication year.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "archiscribe")]
#[command(about = "Year-partitioned cache of OCR lines for transcription")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./archiscribe.toml or ~/.config/archiscribe/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cache root (overrides cache.root; ARCHISCRIBE_CACHE still wins)
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Maximum retry attempts for transient HTTP failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Build (or rebuild) the identifier index
    Index(cmd::index::IndexArgs),
    /// Add cached documents to one year
    Fill(cmd::fill::FillArgs),
    /// Keep years stocked until interrupted
    Watch(cmd::watch::WatchArgs),
    /// Show index and cache stock per year
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(archiscribe_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    archiscribe_core::init_logging(quiet, cli.debug, multi);

    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };
    if let Some(root) = cli.cache {
        config.cache.root = Some(root);
    }
    if let Some(max_retries) = cli.max_retries {
        config.http.max_retries = max_retries;
    }
    archiscribe_core::set_http_config(config.http_config());

    match cli.command {
        Command::Index(args) => cmd::index::run(args, &config).await,
        Command::Fill(args) => cmd::fill::run(args, &config, &progress).await,
        Command::Watch(args) => cmd::watch::run(args, &config, &progress).await,
        Command::Status(args) => cmd::status::run(args, &config).await,
        Command::Config => {
            cmd::status::print_config(&config);
            Ok(())
        }
    }
}
