//! Chatroom server: accepts many TCP connections and broadcasts each client's
//! lines to every other connected client.

pub mod config;
pub mod error;
pub mod gateway;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use config::Config;
use error::ServerError;
use gateway::fanout::Broadcaster;
use gateway::registry::SessionRegistry;

/// Shared server state handed to every connection handler.
#[derive(Clone)]
pub struct ChatState {
    pub registry: Arc<SessionRegistry>,
    pub broadcaster: Broadcaster,
    pub config: Arc<Config>,
}

impl ChatState {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&registry), config.saturation_grace),
            registry,
            config: Arc::new(config),
        }
    }
}

/// A bound server whose accept loop runs in the background.
pub struct RunningServer {
    local_addr: SocketAddr,
    state: ChatState,
    shutdown: CancellationToken,
    accept_loop: JoinHandle<()>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Stop accepting, close every live session and wait for their handlers
    /// to finish tearing down.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.accept_loop.await {
            tracing::error!(?err, "accept loop panicked");
        }
    }
}

/// Bind the configured address and spawn the accept loop.
pub async fn start(config: Config) -> Result<RunningServer, ServerError> {
    let listener = gateway::server::bind(&config).await?;
    let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
        addr: config.bind_addr(),
        source,
    })?;

    let state = ChatState::new(config);
    let shutdown = CancellationToken::new();
    let accept_loop = tokio::spawn(gateway::server::serve(
        listener,
        state.clone(),
        shutdown.clone(),
    ));

    Ok(RunningServer {
        local_addr,
        state,
        shutdown,
        accept_loop,
    })
}
