use std::time::Duration;

use tcptalk_common::protocol::{DEFAULT_MAX_LINE_LEN, DEFAULT_PORT};

/// Chat server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface the listener binds to.
    pub host: String,
    /// Port the listener binds to. `0` picks an ephemeral port.
    pub port: u16,
    /// Connections beyond this many are turned away with `ERR server is full`.
    pub max_connections: usize,
    /// Capacity of each session's outbound queue.
    pub outbound_capacity: usize,
    /// How long a fresh connection has to send its display name.
    pub handshake_timeout: Duration,
    /// Longest inbound line accepted before the connection is dropped.
    pub max_line_length: usize,
    /// How long a publish waits for a full outbound queue to open a slot
    /// before that recipient is disconnected.
    pub saturation_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_connections: 1024,
            outbound_capacity: 256,
            handshake_timeout: Duration::from_secs(10),
            max_line_length: DEFAULT_MAX_LINE_LEN,
            saturation_grace: Duration::from_secs(2),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; missing or unparseable values fall back to
    /// [`Config::default`].
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("TCPTALK_HOST")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.host),
            port: parsed_var("TCPTALK_PORT").unwrap_or(defaults.port),
            max_connections: parsed_var("TCPTALK_MAX_CONNECTIONS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_connections),
            outbound_capacity: parsed_var("TCPTALK_OUTBOUND_CAPACITY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.outbound_capacity),
            handshake_timeout: parsed_var("TCPTALK_HANDSHAKE_TIMEOUT_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.handshake_timeout),
            max_line_length: parsed_var("TCPTALK_MAX_LINE_LENGTH")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_line_length),
            saturation_grace: parsed_var("TCPTALK_SATURATION_GRACE_MS")
                .filter(|n| *n > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.saturation_grace),
        }
    }

    /// `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
