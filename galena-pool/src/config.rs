//! Configuration: CLI flags over an optional TOML file.
//!
//! The file carries `[node]` and `[pool]` sections; any flag given on the
//! command line overrides the file. Validation that needs the node (the
//! reward address check) happens at startup, not here.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_STRATUM_PORT: u16 = 3333;
pub const DEFAULT_WEB_PORT: u16 = 8080;
pub const DEFAULT_DIFFICULTY: f64 = 0.01;
pub const DEFAULT_COINBASE_MESSAGE: &str = "galena solo pool";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("no reward address configured (set --address or [pool].address)")]
    MissingAddress,

    #[error("node RPC credentials missing (set --rpcuser/--rpcpassword or [node] section)")]
    MissingRpcCredentials,
}

/// Command-line flags.
#[derive(Debug, Parser)]
#[command(name = "galena-poold", about = "Solo Bitcoin mining pool", version)]
pub struct Args {
    /// Path to a TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bitcoin node RPC host.
    #[arg(long)]
    pub rpchost: Option<String>,

    /// Bitcoin node RPC port.
    #[arg(long)]
    pub rpcport: Option<u16>,

    /// Bitcoin node RPC username.
    #[arg(long)]
    pub rpcuser: Option<String>,

    /// Bitcoin node RPC password.
    #[arg(long)]
    pub rpcpassword: Option<String>,

    /// Reward address for block payouts.
    #[arg(long)]
    pub address: Option<String>,

    /// Interface the Stratum listener binds.
    #[arg(long)]
    pub host: Option<String>,

    /// Stratum listener port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Initial per-client difficulty.
    #[arg(long)]
    pub difficulty: Option<f64>,

    /// Message embedded in the coinbase input script (capped at 100 bytes).
    #[arg(long = "coinbase-msg")]
    pub coinbase_message: Option<String>,

    /// Serve pool statistics over HTTP.
    #[arg(long)]
    pub web_stats: bool,

    /// Port for the statistics endpoint.
    #[arg(long)]
    pub web_port: Option<u16>,

    /// Enable debug logging.
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    node: NodeSection,
    #[serde(default)]
    pool: PoolSection,
}

#[derive(Debug, Default, Deserialize)]
struct NodeSection {
    rpchost: Option<String>,
    rpcport: Option<u16>,
    rpcuser: Option<String>,
    rpcpassword: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PoolSection {
    address: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    difficulty: Option<f64>,
    coinbase_message: Option<String>,
    web_stats: Option<bool>,
    web_port: Option<u16>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub rpchost: String,
    pub rpcport: u16,
    pub rpcuser: String,
    pub rpcpassword: String,
    pub address: String,
    pub host: String,
    pub port: u16,
    pub difficulty: f64,
    pub coinbase_message: String,
    pub web_stats: bool,
    pub web_port: u16,
    pub verbose: bool,
}

impl Config {
    /// Resolve flags against the optional config file.
    pub fn resolve(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(path.clone(), e))?;
                toml::from_str(&raw).map_err(|e| ConfigError::Parse(path.clone(), e))?
            }
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    fn merge(args: Args, file: FileConfig) -> Result<Self, ConfigError> {
        let address = args
            .address
            .or(file.pool.address)
            .ok_or(ConfigError::MissingAddress)?;
        let rpcuser = args
            .rpcuser
            .or(file.node.rpcuser)
            .ok_or(ConfigError::MissingRpcCredentials)?;
        let rpcpassword = args
            .rpcpassword
            .or(file.node.rpcpassword)
            .ok_or(ConfigError::MissingRpcCredentials)?;

        Ok(Self {
            rpchost: args
                .rpchost
                .or(file.node.rpchost)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            rpcport: args.rpcport.or(file.node.rpcport).unwrap_or(8332),
            rpcuser,
            rpcpassword,
            address,
            host: args
                .host
                .or(file.pool.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: args.port.or(file.pool.port).unwrap_or(DEFAULT_STRATUM_PORT),
            difficulty: args
                .difficulty
                .or(file.pool.difficulty)
                .unwrap_or(DEFAULT_DIFFICULTY),
            coinbase_message: args
                .coinbase_message
                .or(file.pool.coinbase_message)
                .unwrap_or_else(|| DEFAULT_COINBASE_MESSAGE.to_string()),
            web_stats: args.web_stats || file.pool.web_stats.unwrap_or(false),
            web_port: args.web_port.or(file.pool.web_port).unwrap_or(DEFAULT_WEB_PORT),
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_args() -> Args {
        Args::parse_from(["galena-poold"])
    }

    #[test]
    fn test_defaults_applied() {
        let mut args = bare_args();
        args.address = Some("bc1qtest".into());
        args.rpcuser = Some("user".into());
        args.rpcpassword = Some("pass".into());

        let config = Config::merge(args, FileConfig::default()).unwrap();
        assert_eq!(config.rpchost, "127.0.0.1");
        assert_eq!(config.rpcport, 8332);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, DEFAULT_STRATUM_PORT);
        assert_eq!(config.difficulty, DEFAULT_DIFFICULTY);
        assert!(!config.web_stats);
    }

    #[test]
    fn test_missing_address_fails() {
        let mut args = bare_args();
        args.rpcuser = Some("user".into());
        args.rpcpassword = Some("pass".into());
        assert!(matches!(
            Config::merge(args, FileConfig::default()),
            Err(ConfigError::MissingAddress)
        ));
    }

    #[test]
    fn test_missing_credentials_fail() {
        let mut args = bare_args();
        args.address = Some("bc1qtest".into());
        assert!(matches!(
            Config::merge(args, FileConfig::default()),
            Err(ConfigError::MissingRpcCredentials)
        ));
    }

    #[test]
    fn test_file_values_used_when_flags_absent() {
        let file: FileConfig = toml::from_str(
            r#"
            [node]
            rpchost = "10.0.0.2"
            rpcport = 18443
            rpcuser = "u"
            rpcpassword = "p"

            [pool]
            address = "bcrt1qtest"
            port = 4444
            difficulty = 0.5
            web_stats = true
            "#,
        )
        .unwrap();

        let config = Config::merge(bare_args(), file).unwrap();
        assert_eq!(config.rpchost, "10.0.0.2");
        assert_eq!(config.rpcport, 18443);
        assert_eq!(config.address, "bcrt1qtest");
        assert_eq!(config.port, 4444);
        assert_eq!(config.difficulty, 0.5);
        assert!(config.web_stats);
    }

    #[test]
    fn test_flags_override_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [node]
            rpcuser = "file-user"
            rpcpassword = "file-pass"

            [pool]
            address = "file-address"
            port = 4444
            "#,
        )
        .unwrap();

        let args = Args::parse_from([
            "galena-poold",
            "--address",
            "cli-address",
            "--port",
            "5555",
            "--rpcuser",
            "cli-user",
        ]);

        let config = Config::merge(args, file).unwrap();
        assert_eq!(config.address, "cli-address");
        assert_eq!(config.port, 5555);
        assert_eq!(config.rpcuser, "cli-user");
        assert_eq!(config.rpcpassword, "file-pass");
    }
}
