//! Configuration module for the echo server.
//!
//! Command-line arguments only; there is no configuration file.

use crate::error::ServerError;
use clap::Parser;
use std::net::SocketAddr;

/// Address the server binds to when `--listen` is not given.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "echo-server")]
#[command(version = "0.1.0")]
#[command(about = "A TCP echo server with graceful shutdown", long_about = None)]
pub struct CliArgs {
    /// Address to bind to (e.g., 127.0.0.1:8080)
    #[arg(short = 'l', long, default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process arguments.
    pub fn load() -> Result<Self, ServerError> {
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(cli: CliArgs) -> Result<Self, ServerError> {
        let listen = cli
            .listen
            .parse()
            .map_err(|source| ServerError::InvalidAddress {
                addr: cli.listen.clone(),
                source,
            })?;

        Ok(Config {
            listen,
            log_level: cli.log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cli = CliArgs::try_parse_from(["echo-server"]).unwrap();
        let config = Config::from_args(cli).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_overrides() {
        let cli = CliArgs::try_parse_from([
            "echo-server",
            "-l",
            "0.0.0.0:9000",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let config = Config::from_args(cli).unwrap();
        assert_eq!(config.listen, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_listen_address() {
        let cli = CliArgs::try_parse_from(["echo-server", "--listen", "localhost"]).unwrap();
        match Config::from_args(cli) {
            Err(ServerError::InvalidAddress { addr, .. }) => assert_eq!(addr, "localhost"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
