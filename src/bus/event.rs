use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A typed event on the in-process bus. Types are hierarchical by
/// convention (`robot_manager.registering_robot`) but matched as flat
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// A bus subscription identity. The id alone defines equality so a
/// subscriber can be shared between the forward and reverse indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
}

impl Subscriber {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
        }
    }
}

impl Default for Subscriber {
    fn default() -> Self {
        Self::new()
    }
}

/// Well-known event types published by the hub.
pub mod kind {
    /// A device has asked to join the fleet and awaits an operator decision.
    pub const REGISTERING_ROBOT: &str = "robot_manager.registering_robot";

    /// First frame of every SSE stream, carrying the event session record.
    pub const SESSION_ID: &str = "__session_id";

    /// The per-admission decision event, named after the pending triple.
    pub fn register_decision(device_id: &str, ip: &str, robot_type: &str) -> String {
        format!("register.{device_id}{ip}{robot_type}")
    }
}
