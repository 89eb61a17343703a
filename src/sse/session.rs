use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::http::auth::Session;

/// Identifies one open SSE stream, distinct from the logged-in user
/// session it belongs to. The server-minted timestamp and random id let
/// subscribe/unsubscribe calls address exactly this stream instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventSession {
    pub session: Session,
    pub timestamp: i64,
    pub random_id: String,
}

impl EventSession {
    pub fn new(session: Session) -> Self {
        let random_id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        Self {
            session,
            timestamp: chrono::Utc::now().timestamp_millis(),
            random_id,
        }
    }
}

/// Wire envelope of one SSE frame. `encoded_data` is the base64 of the
/// JSON-encoded event data; the whole envelope is JSON-encoded and
/// base64'd again before hitting the `data:` line, so no payload byte can
/// collide with SSE framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub encoded_data: String,
}

/// Request body for `/events/subscribe` and `/events/unsubscribe`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventSubscriptionRequest {
    pub event_session: EventSession,
    pub event_types: Vec<String>,
}
