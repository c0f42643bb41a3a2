//! Per-connection chat session state.

use std::sync::Arc;

use tcptalk_common::SessionId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// A rendered wire line, shared by every recipient of one broadcast.
pub type OutboundLine = Arc<str>;

/// Outcome of offering a line to one session's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The queue is full; the line was not enqueued.
    Saturated,
    /// The session is closing or its write loop has already exited.
    Closed,
}

/// State for a single handshake-complete connection.
///
/// Owned by its connection handler; the registry only holds `Arc` references.
pub struct ClientSession {
    /// Identifier assigned at accept time.
    pub session_id: SessionId,
    /// Display name chosen during the handshake.
    pub name: String,
    outbound: mpsc::Sender<OutboundLine>,
    closer: CancellationToken,
}

impl ClientSession {
    /// Create a session with a bounded outbound queue of `capacity` lines.
    ///
    /// The session's close signal is a child of `parent`, so cancelling the
    /// server's shutdown token closes every session.
    pub fn open(
        session_id: SessionId,
        name: String,
        capacity: usize,
        parent: &CancellationToken,
    ) -> (Self, mpsc::Receiver<OutboundLine>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let session = Self {
            session_id,
            name,
            outbound,
            closer: parent.child_token(),
        };
        (session, rx)
    }

    /// Offer a line without waiting. Never blocks the caller.
    pub fn try_deliver(&self, line: OutboundLine) -> Delivery {
        if self.closer.is_cancelled() {
            return Delivery::Closed;
        }
        match self.outbound.try_send(line) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Saturated,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Wait until `deadline` for a queue slot. `Saturated` means the queue
    /// stayed full the whole time.
    pub async fn deliver_by(&self, line: OutboundLine, deadline: Instant) -> Delivery {
        tokio::select! {
            biased;
            _ = self.closer.cancelled() => Delivery::Closed,
            reserved = time::timeout_at(deadline, self.outbound.reserve()) => match reserved {
                Ok(Ok(permit)) => {
                    permit.send(line);
                    Delivery::Queued
                }
                Ok(Err(_)) => Delivery::Closed,
                Err(_) => Delivery::Saturated,
            },
        }
    }

    /// Ask the session's handler to tear down. Idempotent.
    pub fn close(&self) {
        self.closer.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// The token both of this session's loops select on.
    pub fn close_signal(&self) -> CancellationToken {
        self.closer.clone()
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("session_id", &self.session_id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
