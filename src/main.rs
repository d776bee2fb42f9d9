//! Unified ptdispatch CLI.
//!
//! - `ptdispatch client` - Run the client dispatcher
//! - `ptdispatch server` - Run the server dispatcher
//!
//! The server subcommand is also available as the standalone `ptd-server`
//! binary.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// ptdispatch unified CLI.
#[derive(Parser)]
#[command(
    name = "ptdispatch",
    version,
    about = "Pluggable transport dispatcher",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the client dispatcher.
    #[command(name = "client")]
    Client(Box<ptd_client::ClientArgs>),

    /// Run the server dispatcher.
    #[command(name = "server", alias = "serve")]
    Server(Box<ptd_server::ServerArgs>),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Client(args) => ptd_client::cli::run(*args).await,
        Commands::Server(args) => ptd_server::cli::run(*args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
