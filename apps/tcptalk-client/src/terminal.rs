//! Line-mode terminal front end: stdin lines go out, server events are printed.

use std::io::{self, BufRead, Write};
use std::thread;

use tokio::sync::mpsc;

use crate::duplex::{ChatConnection, DisconnectReason, InboundEvent, UiChannels};
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Say(String),
    Nothing,
}

pub fn parse_input(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Nothing;
    }
    match trimmed {
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Say(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

pub fn render_event(event: &InboundEvent) -> String {
    match event {
        InboundEvent::Joined { name } => format!("* {name} joined"),
        InboundEvent::Left { name } => format!("* {name} left"),
        InboundEvent::Chat { name, body } => format!("{name}: {body}"),
        InboundEvent::Rejected { reason } => format!("! rejected: {reason}"),
        InboundEvent::Disconnected { reason } => format!("! disconnected: {reason}"),
    }
}

/// Read stdin on a plain thread so a blocked read never holds up the runtime.
/// The thread ends at EOF, on a read error, or once `tx` is closed.
pub fn spawn_stdin_reader(tx: mpsc::Sender<String>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("tcptalk-stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::debug!(error = %e, "stdin read failed");
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })
}

/// Drive the session until a terminal event arrives, and return that event.
///
/// `input` closing (stdin EOF) counts as the user quitting.
pub async fn run<W: Write>(
    connection: &ChatConnection,
    ui: UiChannels,
    mut input: mpsc::Receiver<String>,
    mut out: W,
) -> Result<InboundEvent, ClientError> {
    let UiChannels {
        mut inbound,
        outbound,
    } = ui;
    let mut input_open = true;

    loop {
        tokio::select! {
            event = inbound.recv() => {
                let Some(event) = event else {
                    return Ok(InboundEvent::Disconnected {
                        reason: DisconnectReason::LocalShutdown,
                    });
                };
                writeln!(out, "{}", render_event(&event))?;
                out.flush()?;
                if event.is_terminal() {
                    return Ok(event);
                }
            }
            line = input.recv(), if input_open => {
                let command = match line {
                    Some(line) => parse_input(&line),
                    None => {
                        input_open = false;
                        Command::Quit
                    }
                };
                match command {
                    Command::Quit => connection.shutdown(),
                    Command::Say(body) => {
                        // A closed queue means the session is already ending;
                        // the terminal event is on its way.
                        if outbound.send(body).await.is_err() {
                            tracing::debug!("outbound queue closed");
                        }
                    }
                    Command::Nothing => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time;
    use tokio_util::codec::{Framed, LinesCodec};

    #[test]
    fn parses_commands() {
        assert_eq!(parse_input("/quit"), Command::Quit);
        assert_eq!(parse_input("  /exit \n"), Command::Quit);
        assert_eq!(parse_input("   "), Command::Nothing);
        assert_eq!(parse_input(""), Command::Nothing);
        assert_eq!(parse_input("  hi there  "), Command::Say("  hi there  ".into()));
        assert_eq!(parse_input("/quitting"), Command::Say("/quitting".into()));
    }

    #[test]
    fn renders_events() {
        let chat = InboundEvent::Chat {
            name: "bob".into(),
            body: "hi".into(),
        };
        assert_eq!(render_event(&chat), "bob: hi");
        assert_eq!(
            render_event(&InboundEvent::Joined { name: "bob".into() }),
            "* bob joined"
        );
        assert_eq!(
            render_event(&InboundEvent::Left { name: "bob".into() }),
            "* bob left"
        );
        assert_eq!(
            render_event(&InboundEvent::Disconnected {
                reason: DisconnectReason::ServerClosed
            }),
            "! disconnected: server closed the connection"
        );
    }

    async fn connected(
        name: &str,
    ) -> (
        ChatConnection,
        UiChannels,
        Framed<tokio::net::TcpStream, LinesCodec>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig::new(listener.local_addr().unwrap().to_string(), name);
        let (client, accepted) = tokio::join!(ChatConnection::connect(&config), listener.accept());
        let (connection, ui) = client.unwrap();
        (connection, ui, Framed::new(accepted.unwrap().0, LinesCodec::new()))
    }

    #[tokio::test]
    async fn run_relays_both_ways_until_the_server_closes() {
        let (connection, ui, mut server) = connected("alice").await;

        let (input_tx, input_rx) = mpsc::channel(4);
        input_tx.send("hello".into()).await.unwrap();
        input_tx.send("   ".into()).await.unwrap();

        let server_side = async move {
            let step = Duration::from_secs(5);
            let name = time::timeout(step, server.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(name, "alice");
            let said = time::timeout(step, server.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(said, "hello");
            server.send("JOIN bob").await.unwrap();
            server.send("MSG bob hey").await.unwrap();
        };

        let mut out = Vec::new();
        let (outcome, ()) = tokio::join!(run(&connection, ui, input_rx, &mut out), server_side);

        assert_eq!(
            outcome.unwrap(),
            InboundEvent::Disconnected {
                reason: DisconnectReason::ServerClosed
            }
        );
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(
            printed,
            "* bob joined\nbob: hey\n! disconnected: server closed the connection\n"
        );
        connection.join().await;
    }

    #[tokio::test]
    async fn quit_command_ends_the_session() {
        let (connection, ui, mut server) = connected("alice").await;
        assert_eq!(server.next().await.unwrap().unwrap(), "alice");

        let (input_tx, input_rx) = mpsc::channel(4);
        input_tx.send("/quit".into()).await.unwrap();

        let mut out = Vec::new();
        let outcome = time::timeout(
            Duration::from_secs(5),
            run(&connection, ui, input_rx, &mut out),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome.unwrap(),
            InboundEvent::Disconnected {
                reason: DisconnectReason::LocalShutdown
            }
        );
        assert!(connection.is_shut_down());
        connection.join().await;

        assert!(server.next().await.is_none());
    }

    #[tokio::test]
    async fn stdin_eof_counts_as_quitting() {
        let (connection, ui, _server) = connected("alice").await;

        let (input_tx, input_rx) = mpsc::channel::<String>(1);
        drop(input_tx);

        let outcome = run(&connection, ui, input_rx, io::sink()).await.unwrap();
        assert_eq!(
            outcome,
            InboundEvent::Disconnected {
                reason: DisconnectReason::LocalShutdown
            }
        );
        connection.join().await;
    }
}
