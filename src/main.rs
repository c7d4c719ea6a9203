//! echo-server: a TCP echo server with graceful shutdown
//!
//! Every byte received on a connection is written back to its sender.
//! On SIGINT or SIGTERM the listener is closed and the process exits once
//! all open connections have been closed by their peers.
//!
//! Exit status is 1 when startup fails (bad address, bind failure, signal
//! registration) and 0 after a graceful shutdown.

mod config;
mod error;
mod server;
mod shutdown;
mod tracker;

use config::Config;
use server::Server;
use shutdown::SignalListener;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Handlers go in before the listener so an early signal is not lost.
    let signals = match SignalListener::register() {
        Ok(signals) => signals,
        Err(e) => {
            error!(error = %e, "Error registering signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(config.listen) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Error creating server");
            return ExitCode::FAILURE;
        }
    };

    info!(address = %server.local_addr(), "Starting echo-server");

    tokio::spawn(shutdown::forward_signals(
        signals,
        server.shutdown().clone(),
    ));

    server.run().await;
    ExitCode::SUCCESS
}
