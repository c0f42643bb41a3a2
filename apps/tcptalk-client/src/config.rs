use std::time::Duration;

use clap::Parser;
use tcptalk_common::protocol::{DEFAULT_MAX_LINE_LEN, DEFAULT_PORT};

/// Command-line arguments for the `tcptalk` binary.
#[derive(Debug, Parser)]
#[command(name = "tcptalk", version, about = "Terminal chat client for a tcptalk server")]
pub struct Args {
    /// Display name to join the room with.
    #[arg(index = 1)]
    pub username: String,

    /// Server address.
    #[arg(index = 2, default_value = "127.0.0.1")]
    pub ip: String,

    /// Server port.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

/// Settings consumed by the duplex connection core.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the server.
    pub addr: String,
    /// Display name sent as the handshake line.
    pub name: String,
    /// Lines the UI may queue before `send` waits on the socket.
    pub outbound_capacity: usize,
    pub connect_timeout: Duration,
    /// Longest server line accepted before the connection is treated as broken.
    pub max_line_length: usize,
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            name: name.into(),
            outbound_capacity: 64,
            connect_timeout: Duration::from_secs(10),
            // Server lines carry an escaped name and a tag on top of a body.
            max_line_length: DEFAULT_MAX_LINE_LEN * 2,
        }
    }
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        Self::new(host_port(&args.ip, args.port), args.username)
    }
}

/// Join host and port, bracketing bare IPv6 literals.
fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
