use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::websockets::DEFAULT_KEEPALIVE_INTERVAL;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3901";
const DEFAULT_SERVER_NAME: &str = "Remote Server";
const DEFAULT_BUZZ_DURATION: Duration = Duration::from_millis(3000);

/// Runtime configuration, read from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub keepalive_interval: Duration,
    /// Name the embedded server announces in its handshake reply
    pub server_name: String,
    /// How long a remote "buzz" keeps devices running
    pub buzz_duration: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let keepalive_secs = parse_or(
            &lookup,
            "KEEPALIVE_INTERVAL_SECS",
            DEFAULT_KEEPALIVE_INTERVAL.as_secs(),
        );
        let buzz_ms = parse_or(
            &lookup,
            "BUZZ_DURATION_MS",
            DEFAULT_BUZZ_DURATION.as_millis() as u64,
        );

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            keepalive_interval: Duration::from_secs(keepalive_secs.max(1)),
            server_name: lookup("SERVER_NAME").unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string()),
            buzz_duration: Duration::from_millis(buzz_ms),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = %default, "Invalid config value, using default");
            default
        }),
        None => default,
    }
}
