//! Error types for the echo server.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors surfaced by the server.
///
/// Only startup errors (`InvalidAddress`, `Bind`, `Signal`) are fatal. Accept
/// errors are logged by the acceptance loop and never end it.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to register signal handler: {0}")]
    Signal(#[source] io::Error),
}
