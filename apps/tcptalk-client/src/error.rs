use std::io;

use tcptalk_common::protocol::NameError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    InvalidName(#[from] NameError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
