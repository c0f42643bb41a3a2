//! Duplex connection core.
//!
//! One socket, split into a read duty (socket → inbound queue) and a write duty
//! (outbound queue → socket) running as separate tasks. Either duty, or the UI,
//! can end the session; the first cause recorded is the one reported.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tcptalk_common::protocol::validate_name;
use tcptalk_common::ServerLine;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Something for the UI to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Joined { name: String },
    Left { name: String },
    Chat { name: String, body: String },
    /// The server refused the handshake. Terminal.
    Rejected { reason: String },
    /// The session is over. Terminal.
    Disconnected { reason: DisconnectReason },
}

impl InboundEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InboundEvent::Rejected { .. } | InboundEvent::Disconnected { .. }
        )
    }
}

impl From<ServerLine> for InboundEvent {
    fn from(line: ServerLine) -> Self {
        match line {
            ServerLine::Join { name } => InboundEvent::Joined { name },
            ServerLine::Leave { name } => InboundEvent::Left { name },
            ServerLine::Msg { name, body } => InboundEvent::Chat { name, body },
            ServerLine::Error { reason } => InboundEvent::Rejected { reason },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisconnectReason {
    #[error("server closed the connection")]
    ServerClosed,
    #[error("read error: {0}")]
    ReadError(String),
    #[error("write error: {0}")]
    WriteError(String),
    #[error("server sent an oversized line")]
    LineTooLong,
    /// The user quit or the UI stopped sending.
    #[error("you left the chat")]
    LocalShutdown,
}

/// The UI's ends of the two queues.
pub struct UiChannels {
    /// Events to render. Pushed without blocking; closes after the terminal event.
    pub inbound: mpsc::UnboundedReceiver<InboundEvent>,
    /// Lines the user composed. Dropping this sender ends the session.
    pub outbound: mpsc::Sender<String>,
}

/// Shutdown token plus the first recorded cause.
struct ShutdownSignal {
    token: CancellationToken,
    cause: OnceLock<DisconnectReason>,
}

impl ShutdownSignal {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            cause: OnceLock::new(),
        }
    }

    /// First caller's cause wins; later calls only re-cancel. Idempotent.
    fn trigger(&self, cause: DisconnectReason) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    fn cause(&self) -> DisconnectReason {
        self.cause
            .get()
            .cloned()
            .unwrap_or(DisconnectReason::LocalShutdown)
    }
}

/// A live duplex connection to the chat server.
pub struct ChatConnection {
    peer_addr: SocketAddr,
    signal: Arc<ShutdownSignal>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ChatConnection {
    /// Connect, then start both duties. The display name is validated locally
    /// before any connection attempt.
    pub async fn connect(config: &ClientConfig) -> Result<(Self, UiChannels), ClientError> {
        let name = validate_name(&config.name)?.to_string();

        let stream = time::timeout(config.connect_timeout, TcpStream::connect(&config.addr))
            .await
            .map_err(|_| ClientError::ConnectFailed {
                addr: config.addr.clone(),
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            })?
            .map_err(|source| ClientError::ConnectFailed {
                addr: config.addr.clone(),
                source,
            })?;

        Self::start(stream, name, config).map_err(ClientError::from)
    }

    /// Start the read and write duties over an already-connected socket.
    pub fn start(
        stream: TcpStream,
        name: String,
        config: &ClientConfig,
    ) -> io::Result<(Self, UiChannels)> {
        let peer_addr = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not set TCP_NODELAY");
        }
        let (read_half, write_half) = stream.into_split();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let signal = Arc::new(ShutdownSignal::new());

        let reader = tokio::spawn(read_duty(
            FramedRead::new(
                read_half,
                LinesCodec::new_with_max_length(config.max_line_length),
            ),
            inbound_tx,
            Arc::clone(&signal),
        ));
        let writer = tokio::spawn(write_duty(
            FramedWrite::new(write_half, LinesCodec::new()),
            name,
            outbound_rx,
            Arc::clone(&signal),
        ));

        tracing::debug!(%peer_addr, "chat connection started");

        let connection = Self {
            peer_addr,
            signal,
            reader,
            writer,
        };
        let channels = UiChannels {
            inbound: inbound_rx,
            outbound: outbound_tx,
        };
        Ok((connection, channels))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// End the session from the UI side. Safe to call any number of times.
    pub fn shutdown(&self) {
        self.signal.trigger(DisconnectReason::LocalShutdown);
    }

    pub fn is_shut_down(&self) -> bool {
        self.signal.token.is_cancelled()
    }

    /// Resolves once either duty or the UI has ended the session.
    pub async fn closed(&self) {
        self.signal.token.cancelled().await;
    }

    /// Wait for both duties to exit, releasing the socket.
    pub async fn join(self) {
        for (duty, handle) in [("read", self.reader), ("write", self.writer)] {
            if let Err(err) = handle.await {
                tracing::error!(duty, ?err, "duty task failed");
            }
        }
    }
}

/// Socket → inbound queue. Always the one to push the final event.
async fn read_duty<S>(
    mut lines: S,
    inbound: mpsc::UnboundedSender<InboundEvent>,
    signal: Arc<ShutdownSignal>,
) where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    let stopped = loop {
        let next = tokio::select! {
            _ = signal.token.cancelled() => break None,
            next = lines.next() => next,
        };

        match next {
            Some(Ok(line)) => match ServerLine::parse(&line) {
                Ok(server_line) => {
                    let event = InboundEvent::from(server_line);
                    let terminal = event.is_terminal();
                    // A UI that stopped listening is not a reason to stop reading.
                    let _ = inbound.send(event);
                    if terminal {
                        signal.trigger(DisconnectReason::ServerClosed);
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, %line, "ignoring unrecognised server line");
                }
            },
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                break Some(DisconnectReason::LineTooLong)
            }
            Some(Err(LinesCodecError::Io(e))) => break Some(DisconnectReason::ReadError(e.to_string())),
            None => break Some(DisconnectReason::ServerClosed),
        }
    };

    if let Some(cause) = stopped {
        signal.trigger(cause);
    }
    let _ = inbound.send(InboundEvent::Disconnected {
        reason: signal.cause(),
    });
}

/// Display name first, then outbound queue → socket.
async fn write_duty<W>(
    mut sink: W,
    name: String,
    mut outbound: mpsc::Receiver<String>,
    signal: Arc<ShutdownSignal>,
) where
    W: Sink<String, Error = LinesCodecError> + Unpin,
{
    // The handshake goes out before any UI input is pulled.
    if !send_line(&mut sink, name, &signal).await {
        return;
    }

    loop {
        let composed = tokio::select! {
            _ = signal.token.cancelled() => return,
            composed = outbound.recv() => composed,
        };

        let Some(composed) = composed else {
            signal.trigger(DisconnectReason::LocalShutdown);
            return;
        };

        // One message per line; an embedded newline must not smuggle a second
        // line past the framing.
        for part in composed.lines() {
            if !send_line(&mut sink, part.to_string(), &signal).await {
                return;
            }
        }
    }
}

/// Returns `false` when the duty should stop.
async fn send_line<W>(sink: &mut W, line: String, signal: &ShutdownSignal) -> bool
where
    W: Sink<String, Error = LinesCodecError> + Unpin,
{
    tokio::select! {
        _ = signal.token.cancelled() => false,
        result = sink.send(line) => match result {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "write to server failed");
                signal.trigger(DisconnectReason::WriteError(e.to_string()));
                false
            }
        },
    }
}
