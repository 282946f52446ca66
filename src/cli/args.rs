//! CLI argument definitions using clap
//!
//! Commands:
//! - tenant-gate serve [--config <path>] [--port <port>]
//! - tenant-gate check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tenant Gate - multi-tenant admission control in front of an HTTP workload
#[derive(Parser, Debug)]
#[command(name = "tenant-gate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the throttled HTTP server
    Serve {
        /// Path to TOML configuration file. Built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to bind to, overrides `server.port`
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate a configuration file and exit
    ///
    /// Reports every problem found, not just the first.
    CheckConfig {
        /// Path to TOML configuration file
        #[arg(long, default_value = "./tenant-gate.toml")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["tenant-gate", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Command::Serve { config, port } => {
                assert!(config.is_none());
                assert_eq!(port, Some(9000));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_config_default_path() {
        let cli = Cli::try_parse_from(["tenant-gate", "check-config"]).unwrap();
        match cli.command {
            Command::CheckConfig { config } => {
                assert_eq!(config, PathBuf::from("./tenant-gate.toml"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
