#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use tcptalk_server::config::Config;
use tcptalk_server::{ChatState, RunningServer};

/// How long any single network expectation may take before the test fails.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    }
}

/// Start a real server on an ephemeral port.
pub async fn start_server() -> RunningServer {
    start_server_with(test_config()).await
}

pub async fn start_server_with(config: Config) -> RunningServer {
    tcptalk_server::start(config).await.expect("start server")
}

/// Poll until the registry holds exactly `n` sessions.
pub async fn wait_for_sessions(state: &ChatState, n: usize) {
    time::timeout(STEP_TIMEOUT, async {
        while state.registry.len() != n {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {n} sessions, registry has {}",
            state.registry.len()
        )
    });
}

/// A raw line-protocol client.
pub struct TestClient {
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("tcp connect");
        let (read_half, write_half) = stream.into_split();
        Self {
            lines: FramedRead::new(read_half, LinesCodec::new()),
            sink: FramedWrite::new(write_half, LinesCodec::new()),
        }
    }

    /// Connect with a small kernel receive buffer, so a client that stops
    /// reading backs the server up quickly.
    pub async fn connect_with_recv_buffer(addr: SocketAddr, bytes: u32) -> Self {
        let socket = TcpSocket::new_v4().expect("tcp socket");
        socket.set_recv_buffer_size(bytes).expect("set recv buffer");
        let stream = socket.connect(addr).await.expect("tcp connect");
        let (read_half, write_half) = stream.into_split();
        Self {
            lines: FramedRead::new(read_half, LinesCodec::new()),
            sink: FramedWrite::new(write_half, LinesCodec::new()),
        }
    }

    /// Connect and send `name` as the handshake line.
    pub async fn join(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(name).await;
        client
    }

    /// Join and wait until the server has registered the session.
    pub async fn join_and_wait(addr: SocketAddr, name: &str, state: &ChatState, online: usize) -> Self {
        let client = Self::join(addr, name).await;
        wait_for_sessions(state, online).await;
        client
    }

    pub async fn send(&mut self, line: &str) {
        self.sink.send(line).await.expect("send line");
    }

    pub async fn recv(&mut self) -> String {
        time::timeout(STEP_TIMEOUT, self.lines.next())
            .await
            .expect("timeout waiting for a line")
            .expect("stream ended")
            .expect("read error")
    }

    /// Assert the server closes the connection.
    pub async fn expect_closed(&mut self) {
        let next = time::timeout(STEP_TIMEOUT, self.lines.next())
            .await
            .expect("timeout waiting for close");
        match next {
            None | Some(Err(_)) => {}
            Some(Ok(line)) => panic!("expected close, got line {line:?}"),
        }
    }

    /// Assert nothing arrives for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(next) = time::timeout(window, self.lines.next()).await {
            panic!("expected silence, got {next:?}");
        }
    }
}
