//! # Configuration
//!
//! Command-line flags with environment fallbacks, validated into a
//! `ServerConfig` before anything is started. Invalid values are fatal.

use std::net::{SocketAddr, ToSocketAddrs};

use clap::{ArgAction, Parser};

use dkv_common::{DkvError, DkvResult};

use crate::metrics::DEFAULT_WINDOW_SECS;

/// Default listen address; a bare `:port` binds every interface.
pub const DEFAULT_LISTEN_ADDRESS: &str = ":8081";

/// Default number of synthetic entries.
pub const DEFAULT_BIG_MAP_SIZE: usize = 10_000_000;

/// Longest accepted accumulator window, in seconds.
pub const MAX_WINDOW_SECS: usize = 3600;

/// Raw command-line configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "dkv-server", about = "In-memory diagnostic query server")]
pub struct Config {
    /// HTTP listen address, e.g. ":8081" or "127.0.0.1:8081".
    #[arg(long, env = "DKV_LISTEN_ADDRESS", default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen_address: String,

    /// Number of synthetic entries to populate.
    #[arg(long, env = "DKV_BIG_MAP_SIZE", default_value_t = DEFAULT_BIG_MAP_SIZE)]
    pub big_map_size: usize,

    /// Accumulator window in seconds.
    #[arg(long, env = "DKV_WINDOW", default_value_t = DEFAULT_WINDOW_SECS)]
    pub window: usize,

    /// Store shard count (0 = CPU count * 4).
    #[arg(long, env = "DKV_SHARDS", default_value_t = 0)]
    pub shards: usize,

    /// Keep a tight loop running after population to load the scheduler.
    #[arg(long, env = "DKV_TIGHT_LOOP", default_value_t = true, action = ArgAction::Set)]
    pub tight_loop: bool,
}

impl Config {
    /// Parses process arguments; exits with usage on malformed flags.
    pub fn from_args() -> Self {
        Config::parse()
    }
}

/// Validated server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_address: SocketAddr,
    pub big_map_size: usize,
    pub window: usize,
    pub shards: usize,
    pub tight_loop: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_address: SocketAddr::from(([0, 0, 0, 0], 8081)),
            big_map_size: DEFAULT_BIG_MAP_SIZE,
            window: DEFAULT_WINDOW_SECS,
            shards: 0,
            tight_loop: true,
        }
    }
}

impl TryFrom<Config> for ServerConfig {
    type Error = DkvError;

    fn try_from(config: Config) -> DkvResult<Self> {
        let listen_address = resolve_listen_address(&config.listen_address)?;

        if config.window == 0 || config.window > MAX_WINDOW_SECS {
            return Err(DkvError::InvalidConfig(format!(
                "window must be between 1 and {MAX_WINDOW_SECS} seconds, got {}",
                config.window
            )));
        }

        Ok(ServerConfig {
            listen_address,
            big_map_size: config.big_map_size,
            window: config.window,
            shards: config.shards,
            tight_loop: config.tight_loop,
        })
    }
}

/// Resolves `raw` to a socket address, treating `:port` as `0.0.0.0:port`.
pub fn resolve_listen_address(raw: &str) -> DkvResult<SocketAddr> {
    let raw = raw.trim();
    let candidate = if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    };

    candidate
        .to_socket_addrs()
        .map_err(|err| DkvError::InvalidConfig(format!("listen address {raw:?}: {err}")))?
        .next()
        .ok_or_else(|| DkvError::InvalidConfig(format!("listen address {raw:?} did not resolve")))
}
