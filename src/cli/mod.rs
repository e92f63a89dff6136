//! CLI entry point for Lapse.

pub mod inspect;
pub mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Lapse credential and status tooling
#[derive(Parser, Debug)]
#[command(name = "lapse", version, about = "Inspect credentials and watch resource status")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode an access token and show its renewal timing
    Inspect(InspectArgs),
    /// Poll a reservation until it reaches a terminal status
    Watch(WatchArgs),
}

/// Arguments for `lapse inspect`.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Access token (JWT)
    pub token: String,

    /// Seconds before expiry at which renewal is due
    #[arg(long, default_value_t = 120)]
    pub buffer_secs: u64,
}

/// Arguments for `lapse watch`.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Resource to watch
    pub resource_id: String,

    /// Base URL the resource id is appended to
    #[arg(long)]
    pub url: String,

    /// Bearer token sent with each fetch
    #[arg(long)]
    pub token: Option<String>,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lapse=info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
