use std::path::Path;
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tcptalk_server::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file, falling back to the crate directory
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tcptalk_server=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        addr = %config.bind_addr(),
        max_connections = config.max_connections,
        outbound_capacity = config.outbound_capacity,
        "tcptalk-server configured"
    );

    let server = match tcptalk_server::start(config).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "failed to start");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %server.local_addr(), "tcptalk-server listening");

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for ctrl-c");
    }

    tracing::info!(online = server.state().registry.len(), "shutting down");
    server.shutdown().await;
    ExitCode::SUCCESS
}
