//! Lapse CLI binary entry point.

use clap::Parser;
use lapse::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    lapse::cli::init_tracing();

    let result = match cli.command {
        Commands::Inspect(args) => lapse::cli::inspect::handle_inspect(&args.token, args.buffer_secs),
        Commands::Watch(args) => lapse::cli::watch::handle_watch(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
