//! Display-name handshake and the per-connection lifecycle states.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tcptalk_common::protocol::{is_reserved_name, validate_name};
use tcptalk_common::SessionId;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::codec::LinesCodecError;
use tokio_util::sync::CancellationToken;

use crate::error::HandshakeError;
use crate::ChatState;

use super::registry::RegistryError;
use super::session::{ClientSession, OutboundLine};

/// Lifecycle of one accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Active,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Handshaking)
                | (Handshaking, Active)
                | (Handshaking, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }
}

/// Tracks and logs a connection's state transitions.
#[derive(Debug)]
pub struct Lifecycle {
    session_id: SessionId,
    peer: SocketAddr,
    state: ConnectionState,
}

impl Lifecycle {
    pub fn new(session_id: SessionId, peer: SocketAddr) -> Self {
        Self {
            session_id,
            peer,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn advance(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(
            session_id = %self.session_id,
            peer = %self.peer,
            from = ?self.state,
            to = ?next,
            "connection state"
        );
        self.state = next;
    }
}

/// Read exactly one line and validate it as a display name.
pub async fn read_display_name<S>(lines: &mut S, timeout: Duration) -> Result<String, HandshakeError>
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    let next = time::timeout(timeout, lines.next())
        .await
        .map_err(|_| HandshakeError::Timeout)?;

    let raw = match next {
        Some(Ok(line)) => line,
        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => return Err(HandshakeError::LineTooLong),
        Some(Err(LinesCodecError::Io(e))) => return Err(HandshakeError::Io(e)),
        None => return Err(HandshakeError::Closed),
    };

    let name = validate_name(&raw)?;
    if is_reserved_name(name) {
        return Err(HandshakeError::Reserved);
    }
    Ok(name.to_string())
}

/// Run the handshake and register the new session.
///
/// Returns the session and the receiving end of its outbound queue. Nothing is
/// registered unless this returns `Ok`.
pub async fn handle_handshake<S>(
    state: &ChatState,
    lines: &mut S,
    session_id: &SessionId,
    shutdown: &CancellationToken,
) -> Result<(Arc<ClientSession>, mpsc::Receiver<OutboundLine>), HandshakeError>
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    let name = read_display_name(lines, state.config.handshake_timeout).await?;

    let (session, outbound_rx) = ClientSession::open(
        session_id.clone(),
        name,
        state.config.outbound_capacity,
        shutdown,
    );
    let session = Arc::new(session);

    state
        .registry
        .register(session_id.clone(), Arc::clone(&session))
        .map_err(|err| match err {
            RegistryError::NameTaken(_) => HandshakeError::NameTaken,
            RegistryError::DuplicateId(id) => HandshakeError::DuplicateId(id),
        })?;

    Ok((session, outbound_rx))
}
