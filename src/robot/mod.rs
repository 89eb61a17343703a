//! Robot identity, messages, and the per-device handler triad.
//!
//! Every live device is represented by three cooperating objects: a
//! connection handler owning the session's I/O lifecycle, a message handler
//! owning the inbound queue, and a robot state record. Concrete robot types
//! compose the base implementations and override what they need.

mod handler;
mod msg;
pub mod example;
pub mod proximity_sensor;
pub mod registry;

pub use handler::{BaseConnHandler, BaseRobotHandler, ConnHandler, RobotHandler};
pub use msg::{source, Msg, Payload, TransferStream, MSG_QUICK_ACTION, MSG_TRANSFER};

use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Robot category tag; decides which factory builds the handler triad.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RobotType(pub String);

impl RobotType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RobotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RobotType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RobotType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

pub mod status {
    pub const ONLINE: &str = "online";
    pub const CONNECTED: &str = "connected";
    pub const ACTIVE: &str = "active";
    pub const OFFLINE: &str = "offline";
}

/// Common state carried by every robot. The JSON projection omits the auth
/// token and any zero-valued optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseRobot {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    pub robot_type: RobotType,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
    #[serde(skip)]
    pub auth_token: String,
}

impl BaseRobot {
    pub fn new(device_id: &str, ip: &str, robot_type: RobotType) -> Self {
        Self {
            device_id: device_id.to_string(),
            ip: ip.to_string(),
            robot_type,
            status: status::ONLINE.to_string(),
            battery: None,
            last_seen: None,
            auth_token: String::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(
            self.status.as_str(),
            status::ONLINE | status::CONNECTED | status::ACTIVE
        )
    }

    /// One-line rendering for the terminal and logs.
    pub fn describe(&self) -> String {
        format!(
            "Robot(device_id={}, type={}, ip={}, status={})",
            self.device_id, self.robot_type, self.ip, self.status
        )
    }
}

/// Shared view of a robot's state. Mutators exist because a live robot's
/// ip, status and last-seen change underneath readers (transfer events,
/// inbound traffic).
pub trait Robot: Send + Sync {
    fn snapshot(&self) -> BaseRobot;

    fn to_json(&self) -> Value {
        serde_json::to_value(self.snapshot()).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    fn set_ip(&self, ip: &str);
    fn set_status(&self, status: &str);
    fn touch(&self, last_seen: i64);

    fn is_online(&self) -> bool {
        self.snapshot().is_online()
    }

    fn describe(&self) -> String {
        self.snapshot().describe()
    }
}

impl std::fmt::Debug for dyn Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Lock-guarded [`BaseRobot`] for composition into concrete robot types.
pub struct BaseRobotState {
    base: RwLock<BaseRobot>,
}

impl BaseRobotState {
    pub fn new(base: BaseRobot) -> Self {
        Self {
            base: RwLock::new(base),
        }
    }
}

impl Robot for BaseRobotState {
    fn snapshot(&self) -> BaseRobot {
        self.base.read().unwrap().clone()
    }

    fn set_ip(&self, ip: &str) {
        self.base.write().unwrap().ip = ip.to_string();
    }

    fn set_status(&self, status: &str) {
        self.base.write().unwrap().status = status.to_string();
    }

    fn touch(&self, last_seen: i64) {
        self.base.write().unwrap().last_seen = Some(last_seen);
    }
}
