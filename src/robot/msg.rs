use std::fmt;

use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;

/// Verb that hands raw socket control to the robot's handler.
pub const MSG_TRANSFER: &str = "TRANSFER";
/// Health-ping style action triggered from the REST surface.
pub const MSG_QUICK_ACTION: &str = "quick_action";

/// Message originators, for tracing.
pub mod source {
    pub const TCP_SERVER: &str = "tcp_server";
    pub const HTTP_SERVER: &str = "http_server";
    pub const TERMINAL: &str = "terminal";
}

/// Both halves of a robot's socket, moved to the handler during a
/// `TRANSFER` and moved back over the reply channel when it relinquishes.
pub struct TransferStream {
    pub reader: BufReader<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
}

pub enum Payload {
    None,
    Json(Value),
    Conn(TransferStream),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::None => f.write_str("None"),
            Payload::Json(v) => write!(f, "Json({v})"),
            Payload::Conn(_) => f.write_str("Conn(..)"),
        }
    }
}

/// An inbound message for a robot's handler. The reply sender, when
/// present, lets the handler answer without ever blocking: a oneshot
/// accepts its single value immediately.
pub struct Msg {
    pub msg: String,
    pub payload: Payload,
    pub source: String,
    pub reply: Option<oneshot::Sender<Payload>>,
}

impl Msg {
    pub fn new(msg: impl Into<String>, source: &str) -> Self {
        Self {
            msg: msg.into(),
            payload: Payload::None,
            source: source.to_string(),
            reply: None,
        }
    }

    pub fn with_json(msg: impl Into<String>, source: &str, data: Value) -> Self {
        Self {
            msg: msg.into(),
            payload: Payload::Json(data),
            source: source.to_string(),
            reply: None,
        }
    }

    /// Build the socket-handoff message for the `TRANSFER` verb.
    pub fn transfer(stream: TransferStream, reply: oneshot::Sender<Payload>) -> Self {
        Self {
            msg: MSG_TRANSFER.to_string(),
            payload: Payload::Conn(stream),
            source: source::TCP_SERVER.to_string(),
            reply: Some(reply),
        }
    }
}

impl fmt::Debug for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Msg")
            .field("msg", &self.msg)
            .field("payload", &self.payload)
            .field("source", &self.source)
            .field("reply", &self.reply.is_some())
            .finish()
    }
}
