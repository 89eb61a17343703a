//! SSE fan-out gateway.
//!
//! Binds authenticated operator sessions to the event bus. Each open
//! stream gets an [`EventsClient`] with its own bus subscriber and
//! blocking queue; a drain task turns queued events into double-encoded
//! frames. A user session holds at most one live stream - re-opening
//! evicts the prior client.

mod client;
mod session;

pub use client::EventsClient;
pub use session::{EventSession, EventSubscriptionRequest, SentEvent};

use std::sync::Arc;

use base64::prelude::{Engine, BASE64_STANDARD};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::bus::{kind, EventBus};
use crate::http::auth::Session;
use crate::sync::SafeMap;

/// Depth of the per-stream outbound frame buffer; a client that cannot
/// drain it in time starts back-pressuring its own drain task only.
const FRAME_BUFFER: usize = 64;

pub struct EventsGateway {
    bus: Arc<EventBus>,
    clients: SafeMap<Session, Arc<EventsClient>>,
}

impl EventsGateway {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            clients: SafeMap::new(),
        }
    }

    /// Register a stream for `session`, evicting any prior one, subscribe
    /// it to `initial_events`, and start the drain task. Returns the new
    /// client and the receiver of encoded frames; dropping the receiver
    /// (client disconnect) triggers cleanup.
    pub fn open(
        self: &Arc<Self>,
        session: Session,
        initial_events: Vec<String>,
    ) -> (Arc<EventsClient>, mpsc::Receiver<String>) {
        if let Some(prior) = self.clients.get(&session) {
            self.cleanup(&prior);
        }

        let event_session = EventSession::new(session.clone());
        let client = Arc::new(EventsClient::new(event_session));
        self.clients.set(session, Arc::clone(&client));

        for event_type in &initial_events {
            client.subscribe_to(&self.bus, event_type);
        }
        tracing::debug!(
            session = %client.session.random_id,
            events = ?initial_events,
            "SSE client registered"
        );

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let gateway = Arc::clone(self);
        let drain = Arc::clone(&client);
        tokio::spawn(async move {
            gateway.drain(drain, tx).await;
        });

        (client, rx)
    }

    async fn drain(&self, client: Arc<EventsClient>, tx: mpsc::Sender<String>) {
        let mut event_id: u64 = 0;

        // handshake: tell the client its event session so it can manage
        // subscriptions over REST
        let session_data =
            serde_json::to_value(&client.session).unwrap_or(Value::Null);
        if let Some(frame) = encode_frame(event_id, kind::SESSION_ID, &session_data) {
            if tx.send(frame).await.is_err() {
                self.cleanup(&client);
                return;
            }
        }

        let queue = client.queue();
        while let Some(event) = queue.read(client.done()).await {
            event_id += 1;
            let Some(frame) = encode_frame(event_id, &event.event_type, &event.data) else {
                continue;
            };
            if tx.send(frame).await.is_err() {
                // consumer hung up
                break;
            }
        }
        self.cleanup(&client);
    }

    /// Look up the stream a subscribe/unsubscribe call addresses. The full
    /// event session must match, not just the user session.
    pub fn get_client(&self, event_session: &EventSession) -> Option<Arc<EventsClient>> {
        self.clients
            .get(&event_session.session)
            .filter(|c| c.session == *event_session && !c.ended())
    }

    /// Tear a client down: mark ended, close its queue, drop it from the
    /// gateway map, unsubscribe it from every event. Runs at most once per
    /// client no matter how often it is called.
    pub fn cleanup(&self, client: &Arc<EventsClient>) {
        if !client.end() {
            return;
        }
        client.close_queue();
        self.clients
            .pop_if(&client.session.session, |resident| Arc::ptr_eq(resident, client));
        self.bus.unsubscribe("", &client.subscriber);
        tracing::debug!(session = %client.session.random_id, "SSE client cleaned up");
    }

    /// Drop every live stream; part of hub shutdown.
    pub fn shutdown(&self) {
        for client in self.clients.values() {
            self.cleanup(&client);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

/// Build one wire frame: data JSON -> base64, wrapped in the envelope,
/// envelope JSON -> base64.
pub fn encode_frame(id: u64, event_type: &str, data: &Value) -> Option<String> {
    let inner = serde_json::to_vec(data).ok()?;
    let envelope = SentEvent {
        id: id.to_string(),
        event_type: event_type.to_string(),
        encoded_data: BASE64_STANDARD.encode(inner),
    };
    let outer = serde_json::to_vec(&envelope).ok()?;
    Some(BASE64_STANDARD.encode(outer))
}
