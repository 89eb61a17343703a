//! Ops terminal: a plain-TCP command line for debugging and fleet
//! administration. Connect with netcat, type `help`.

mod commands;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, Subscriber};
use crate::manager::RobotManager;

pub async fn serve(
    listener: TcpListener,
    manager: Arc<RobotManager>,
    bus: Arc<EventBus>,
    token: CancellationToken,
) -> std::io::Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "terminal server listening");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "terminal connection");
                        let manager = Arc::clone(&manager);
                        let bus = Arc::clone(&bus);
                        let token = token.clone();
                        tokio::spawn(handle_connection(stream, manager, bus, token));
                    }
                    Err(e) => tracing::warn!(error = %e, "terminal accept failed"),
                }
            }
        }
    }

    tracing::info!("terminal server shut down");
    Ok(())
}

/// Shared writer so bus subscription output can interleave with prompts.
pub(crate) type TerminalWriter = Arc<Mutex<OwnedWriteHalf>>;

async fn handle_connection(
    stream: TcpStream,
    manager: Arc<RobotManager>,
    bus: Arc<EventBus>,
    token: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let writer: TerminalWriter = Arc::new(Mutex::new(write_half));

    let ctx = commands::CommandContext {
        writer: Arc::clone(&writer),
        manager,
        bus,
        subscriber: Subscriber::new(),
        main_token: token.clone(),
    };

    write_lines(
        &writer,
        "=== Robohub Terminal ===\nType 'help' for available commands.\n> ",
    )
    .await;

    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            _ = token.cancelled() => {
                write_lines(&writer, "\nTerminal session ended.\n").await;
                break;
            }
            read = reader.read_line(&mut line) => read,
        };
        match read {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let input = line.trim();
        if input.is_empty() {
            write_lines(&writer, "> ").await;
            continue;
        }

        match commands::execute(&ctx, input).await {
            commands::Outcome::Continue => {}
            commands::Outcome::Exit => {
                write_lines(&writer, "Goodbye!\n").await;
                break;
            }
            commands::Outcome::Error(msg) => {
                write_lines(&writer, &format!("Error: {msg}\n")).await;
            }
        }
        write_lines(&writer, "> ").await;
    }

    // leaving the session drops its live event subscriptions
    ctx.bus.unsubscribe("", &ctx.subscriber);
}

pub(crate) async fn write_lines(writer: &TerminalWriter, text: &str) {
    let mut guard = writer.lock().await;
    let _ = guard.write_all(text.as_bytes()).await;
}
