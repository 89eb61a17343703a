//! One robot socket's protocol loop.
//!
//! Newline-delimited UTF-8, one verb per line. `REGISTER` runs the
//! admission workflow inline (the loop intentionally blocks on it);
//! `TRANSFER` moves the socket halves to the robot's handler and parks
//! until the handler passes them back over the reply channel - the handler
//! owns completion, there is no server-side transfer timeout. Anything
//! else is forwarded verbatim to the handler addressed by the peer IP.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::HubError;
use crate::manager::RobotManager;
use crate::robot::{source, Msg, Payload, RobotType, TransferStream};

const VERB_REGISTER: &str = "REGISTER";
const VERB_TRANSFER: &str = "TRANSFER";

pub async fn run(
    stream: TcpStream,
    peer: SocketAddr,
    manager: Arc<RobotManager>,
    token: CancellationToken,
) {
    let ip = peer.ip().to_string();
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = write_half;
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            _ = token.cancelled() => return,
            read = reader.read_line(&mut line) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "socket read failed");
                break;
            }
        }

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        tracing::debug!(peer = %peer, msg = %message, "robot line");

        let mut tokens = message.split_whitespace();
        match tokens.next() {
            Some(VERB_REGISTER) => {
                let (robot_type, device_id) = (tokens.next(), tokens.next());
                let (Some(robot_type), Some(device_id)) = (robot_type, device_id) else {
                    let e = HubError::InvalidInput;
                    if !send(&mut writer, &format!("ERROR {}\n", e.wire_code())).await {
                        break;
                    }
                    continue;
                };
                // provisional ack: the request reached the hub and now
                // awaits the operator
                if !send(&mut writer, "REGISTERING\n").await {
                    break;
                }
                let reply = match manager
                    .register_robot(device_id, &ip, &RobotType::from(robot_type))
                    .await
                {
                    Ok(()) => "OK\n".to_string(),
                    Err(e) => format!("ERROR {}\n", e.wire_code()),
                };
                if !send(&mut writer, &reply).await {
                    break;
                }
            }
            Some(VERB_TRANSFER) => {
                let handler = match manager.get_handler(None, Some(&ip)) {
                    Ok(handler) => handler,
                    Err(_) => {
                        if !send(&mut writer, "ERROR NO_ROBOT_REGISTERED_WITH_IP\n").await {
                            break;
                        }
                        continue;
                    }
                };

                let (reply_tx, reply_rx) = oneshot::channel();
                let msg = Msg::transfer(TransferStream { reader, writer }, reply_tx);
                if let Err(e) = handler.send_msg(msg) {
                    // the socket moved with the message; nothing left to
                    // answer on
                    tracing::warn!(peer = %peer, error = %e, "transfer enqueue failed");
                    return;
                }
                match reply_rx.await {
                    Ok(Payload::Conn(stream)) => {
                        reader = stream.reader;
                        writer = stream.writer;
                    }
                    _ => {
                        tracing::warn!(peer = %peer, "handler did not return the socket");
                        return;
                    }
                }
            }
            Some(_) => {
                let result = manager.send_message(
                    None,
                    Some(&ip),
                    Msg::new(message, source::TCP_SERVER),
                );
                match result {
                    Ok(()) => {}
                    Err(HubError::RobotNotFound) => {
                        if !send(&mut writer, "ERROR NO_ROBOT_REGISTERED_WITH_IP\n").await {
                            break;
                        }
                    }
                    Err(e) => {
                        if !send(&mut writer, &format!("ERROR {}\n", e.wire_code())).await {
                            break;
                        }
                    }
                }
            }
            None => {}
        }
    }

    tracing::debug!(peer = %peer, "robot connection closed");
}

async fn send(writer: &mut tokio::net::tcp::OwnedWriteHalf, text: &str) -> bool {
    writer.write_all(text.as_bytes()).await.is_ok()
}
