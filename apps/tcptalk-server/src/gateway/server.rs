//! TCP accept loop and per-connection event loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tcptalk_common::{ServerLine, SessionId};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::time;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::error::{DisconnectReason, ServerError};
use crate::ChatState;

use super::events::ChatEvent;
use super::fanout::Broadcaster;
use super::handler::{handle_handshake, ConnectionState, Lifecycle};
use super::session::{ClientSession, OutboundLine};

/// Pause after a failed `accept` so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound on writing a final `ERR` line to a peer we are turning away.
const REJECT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

const SERVER_FULL_REASON: &str = "server is full";

/// Bind the listening socket. Failure here is fatal for the process.
pub async fn bind(config: &Config) -> Result<TcpListener, ServerError> {
    let addr = config.bind_addr();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Accept connections until `shutdown` is cancelled.
///
/// Each socket gets its own task; the loop never waits on a handler. Returns
/// once every spawned connection task has finished.
pub async fn serve(listener: TcpListener, state: ChatState, shutdown: CancellationToken) {
    let limiter = Arc::new(Semaphore::new(state.config.max_connections));
    let connections = TaskTracker::new();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let permit = match Arc::clone(&limiter).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    %peer,
                    max_connections = state.config.max_connections,
                    "connection limit reached, turning peer away"
                );
                connections.spawn(turn_away(stream, SERVER_FULL_REASON));
                continue;
            }
        };

        let state = state.clone();
        let shutdown = shutdown.clone();
        connections.spawn(async move {
            handle_connection(stream, peer, state, shutdown).await;
            drop(permit);
        });
    }

    drop(listener);
    connections.close();
    tracing::info!(pending = connections.len(), "accept loop stopped, draining connections");
    connections.wait().await;
}

/// Write one `ERR` line and close.
async fn turn_away(mut stream: TcpStream, reason: &str) {
    let line = format!(
        "{}\n",
        ServerLine::Error {
            reason: reason.to_string()
        }
    );
    let _ = time::timeout(REJECT_WRITE_TIMEOUT, async {
        stream.write_all(line.as_bytes()).await?;
        stream.shutdown().await
    })
    .await;
}

/// Drive one connection from accept to close.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: ChatState,
    shutdown: CancellationToken,
) {
    let session_id = SessionId::new();
    let mut lifecycle = Lifecycle::new(session_id.clone(), peer);
    tracing::debug!(session_id = %session_id, %peer, "connection accepted");

    let (read_half, write_half) = stream.into_split();
    let mut lines = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(state.config.max_line_length),
    );
    let mut sink = FramedWrite::new(write_half, LinesCodec::new());

    // Step 1: display-name handshake.
    lifecycle.advance(ConnectionState::Handshaking);
    let handshake = tokio::select! {
        _ = shutdown.cancelled() => Err(crate::error::HandshakeError::Closed),
        result = handle_handshake(&state, &mut lines, &session_id, &shutdown) => result,
    };

    let (session, outbound_rx) = match handshake {
        Ok(pair) => pair,
        Err(err) => {
            tracing::info!(session_id = %session_id, %peer, reason = %err, "handshake rejected");
            lifecycle.advance(ConnectionState::Closing);
            if let Some(reply) = err.reply() {
                let _ = time::timeout(REJECT_WRITE_TIMEOUT, sink.send(reply.render())).await;
            }
            lifecycle.advance(ConnectionState::Closed);
            return;
        }
    };

    // Step 2: active session.
    lifecycle.advance(ConnectionState::Active);
    tracing::info!(
        session_id = %session_id,
        name = %session.name,
        %peer,
        online = state.registry.len(),
        "session joined"
    );
    state.broadcaster.publish(
        &ChatEvent::Joined {
            name: session.name.clone(),
        },
        &session_id,
    )
    .await;

    let writer = tokio::spawn(write_loop(sink, outbound_rx, session.close_signal()));
    let read_reason = read_loop(
        &mut lines,
        &session,
        &state.broadcaster,
        state.config.max_line_length,
    )
    .await;

    // Step 3: teardown.
    lifecycle.advance(ConnectionState::Closing);
    session.close();
    state.registry.deregister(&session_id);
    state.broadcaster.publish(
        &ChatEvent::Left {
            name: session.name.clone(),
        },
        &session_id,
    )
    .await;

    let write_reason = writer.await.ok();
    let reason = match (read_reason, write_reason) {
        (DisconnectReason::Closed, Some(write @ DisconnectReason::WriteError(_))) => write,
        (read, _) => read,
    };
    tracing::info!(
        session_id = %session_id,
        name = %session.name,
        %peer,
        reason = %reason,
        online = state.registry.len(),
        "session left"
    );
    lifecycle.advance(ConnectionState::Closed);
}

/// Publish every complete inbound line until the peer goes away or the session
/// is closed.
async fn read_loop<S>(
    lines: &mut S,
    session: &ClientSession,
    broadcaster: &Broadcaster,
    max_line_length: usize,
) -> DisconnectReason
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    let closer = session.close_signal();
    loop {
        let next = tokio::select! {
            _ = closer.cancelled() => return DisconnectReason::Closed,
            next = lines.next() => next,
        };

        match next {
            Some(Ok(body)) => {
                broadcaster.publish(
                    &ChatEvent::Message {
                        name: session.name.clone(),
                        body,
                    },
                    &session.session_id,
                )
                .await;
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                return DisconnectReason::LineTooLong {
                    max: max_line_length,
                }
            }
            Some(Err(LinesCodecError::Io(e))) => return DisconnectReason::ReadError(e),
            None => return DisconnectReason::Eof,
        }
    }
}

/// Drain the outbound queue to the socket, one flush per batch of queued
/// lines. Fires `closer` on exit so the read side stops too.
async fn write_loop<W>(
    mut sink: W,
    mut outbound: mpsc::Receiver<OutboundLine>,
    closer: CancellationToken,
) -> DisconnectReason
where
    W: Sink<OutboundLine, Error = LinesCodecError> + Unpin,
{
    let reason = loop {
        let line = tokio::select! {
            _ = closer.cancelled() => break DisconnectReason::Closed,
            line = outbound.recv() => match line {
                Some(line) => line,
                None => break DisconnectReason::Closed,
            },
        };

        // Everything already queued goes out with a single flush. A peer that
        // stops reading must not pin this task past cancellation.
        let batch = async {
            sink.feed(line).await?;
            while let Ok(next) = outbound.try_recv() {
                sink.feed(next).await?;
            }
            sink.flush().await?;
            Ok::<_, LinesCodecError>(())
        };
        tokio::select! {
            _ = closer.cancelled() => break DisconnectReason::Closed,
            result = batch => {
                if let Err(e) = result {
                    break DisconnectReason::WriteError(codec_error_into_io(e));
                }
            }
        }
    };

    closer.cancel();
    reason
}

fn codec_error_into_io(err: LinesCodecError) -> std::io::Error {
    match err {
        LinesCodecError::Io(e) => e,
        other => std::io::Error::other(other),
    }
}
