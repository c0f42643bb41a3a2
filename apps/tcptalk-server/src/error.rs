use std::io;

use tcptalk_common::protocol::NameError;
use tcptalk_common::{ServerLine, SessionId};
use thiserror::Error;

/// Process-level failure. Only acquiring the listening socket is fatal.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Why a connection never made it past the display-name handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    InvalidName(#[from] NameError),
    #[error("display name is reserved")]
    Reserved,
    #[error("display name is already taken")]
    NameTaken,
    #[error("session id {0} collided with a live session")]
    DuplicateId(SessionId),
    #[error("timed out waiting for a display name")]
    Timeout,
    #[error("display name line is too long")]
    LineTooLong,
    #[error("connection closed before a display name was sent")]
    Closed,
    #[error("read error during handshake: {0}")]
    Io(#[source] io::Error),
}

impl HandshakeError {
    /// The `ERR` line to send before closing, if the peer can still read one.
    pub fn reply(&self) -> Option<ServerLine> {
        match self {
            HandshakeError::Closed | HandshakeError::Io(_) => None,
            other => Some(ServerLine::Error {
                reason: other.to_string(),
            }),
        }
    }
}

/// Why an established session ended. Every variant is a normal disconnect.
#[derive(Debug, Error)]
pub enum DisconnectReason {
    #[error("peer closed the connection")]
    Eof,
    #[error("read error: {0}")]
    ReadError(#[source] io::Error),
    #[error("inbound line exceeded {max} bytes")]
    LineTooLong { max: usize },
    #[error("write error: {0}")]
    WriteError(#[source] io::Error),
    #[error("session closed by the server")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_problems_are_reported_to_the_peer() {
        let err = HandshakeError::from(NameError::Empty);
        assert_eq!(
            err.reply(),
            Some(ServerLine::Error {
                reason: "display name cannot be empty".into()
            })
        );
        assert_eq!(
            HandshakeError::NameTaken.reply().unwrap().render(),
            "ERR display name is already taken"
        );
    }

    #[test]
    fn dead_sockets_get_no_reply() {
        assert!(HandshakeError::Closed.reply().is_none());
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(HandshakeError::Io(io_err).reply().is_none());
    }
}
