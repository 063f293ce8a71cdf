//! Runtime configuration from environment variables (`.env` is loaded by `main` via dotenvy).

use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_SEND_BUFFER: usize = 64;
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Close a connection after this many seconds without a ping.
    pub ping_timeout_secs: u64,
    /// Outbound frames buffered per connection before delivery to it starts dropping.
    pub send_buffer: usize,
    pub max_message_len: usize,
    /// Allowed browser origin; any origin when `None`.
    pub cors_allow_origin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            ping_timeout_secs: DEFAULT_PING_TIMEOUT_SECS,
            send_buffer: DEFAULT_SEND_BUFFER,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            cors_allow_origin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", "socket address", DEFAULT_BIND_ADDR)?,
            ping_timeout_secs: parse_or(
                &lookup,
                "WS_PING_TIMEOUT_SECS",
                "number of seconds",
                DEFAULT_PING_TIMEOUT_SECS,
            )?,
            send_buffer: parse_or(&lookup, "WS_SEND_BUFFER", "positive integer", DEFAULT_SEND_BUFFER)?,
            max_message_len: parse_or(
                &lookup,
                "MAX_MESSAGE_LEN",
                "positive integer",
                DEFAULT_MAX_MESSAGE_LEN,
            )?,
            cors_allow_origin: lookup("CORS_ALLOW_ORIGIN")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

fn parse_or<F, T, D>(
    lookup: &F,
    var: &'static str,
    expected: &'static str,
    default: D,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    D: ToString,
{
    let value = lookup(var).unwrap_or_else(|| default.to_string());
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        expected,
        value,
    })
}
