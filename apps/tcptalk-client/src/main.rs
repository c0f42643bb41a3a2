use std::io;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tcptalk_client::config::{Args, ClientConfig};
use tcptalk_client::{terminal, ChatConnection, InboundEvent};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // stdout belongs to the chat; diagnostics go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = ClientConfig::from(args);
    let (connection, ui) = match ChatConnection::connect(&config).await {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    println!("Connected to {} as {}", connection.peer_addr(), config.name.trim());

    let (input_tx, input_rx) = mpsc::channel(16);
    if let Err(err) = terminal::spawn_stdin_reader(input_tx) {
        eprintln!("failed to read from the terminal: {err}");
        connection.shutdown();
        connection.join().await;
        return ExitCode::FAILURE;
    }

    let outcome = terminal::run(&connection, ui, input_rx, io::stdout()).await;
    connection.shutdown();
    connection.join().await;

    match outcome {
        Ok(InboundEvent::Rejected { .. }) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
