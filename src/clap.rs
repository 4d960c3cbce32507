// =============================================================================
// Matrixon Pseudo-Identity Server - Clap Module
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Command line interface for the pseudo-identity server: start the client
//   API, or load and validate a configuration file without serving.
//
// =============================================================================

use std::{net::IpAddr, path::PathBuf, time::Instant};

use clap::{Parser, Subcommand};
use tracing::{debug, instrument};

/// Returns the current version of the crate with extra info if supplied
///
/// Set the environment variable `MATRIXON_VERSION_EXTRA` at build time to
/// include it in parenthesis after the SemVer version, e.g. a git commit.
pub fn version() -> String {
    let cargo_pkg_version = env!("CARGO_PKG_VERSION");

    match option_env!("MATRIXON_VERSION_EXTRA") {
        Some(x) => format!("{} ({})", cargo_pkg_version, x),
        None => cargo_pkg_version.to_owned(),
    }
}

/// Matrixon pseudo-identity server
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(about, version, name = "matrixon-pseudoid")]
pub struct Args {
    /// Path to configuration file
    #[clap(short, long, env = "MATRIXON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the client API server
    Start {
        /// Address to bind to, overrides the config file
        #[clap(long)]
        address: Option<IpAddr>,

        /// Port to bind to, overrides the config file
        #[clap(long)]
        port: Option<u16>,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[instrument(level = "debug")]
pub fn parse() -> Args {
    let start = Instant::now();
    let args = Args::parse();
    debug!("✅ Command line arguments parsed in {:?}", start.elapsed());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_format() {
        let version_str = version();
        assert!(version_str.starts_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_start_overrides() {
        let args = Args::try_parse_from([
            "matrixon-pseudoid",
            "--config",
            "matrixon.toml",
            "start",
            "--address",
            "0.0.0.0",
            "--port",
            "9000",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("matrixon.toml")));
        assert_eq!(
            args.command,
            Commands::Start {
                address: Some("0.0.0.0".parse().unwrap()),
                port: Some(9000),
            }
        );
    }

    #[test]
    fn test_check_config_subcommand() {
        let args = Args::try_parse_from(["matrixon-pseudoid", "check-config"]).unwrap();
        assert_eq!(args.command, Commands::CheckConfig);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Args::try_parse_from(["matrixon-pseudoid", "start", "--port", "http"]).is_err());
    }
}
