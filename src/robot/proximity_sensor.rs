//! Proximity sensor robots: report distance readings over the line
//! protocol and echo during socket transfers.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::HubError;

use super::registry::TypeRegistryBuilder;
use super::{
    status, BaseConnHandler, BaseRobot, BaseRobotHandler, BaseRobotState, ConnHandler, Msg,
    Payload, Robot, RobotHandler, RobotType, MSG_QUICK_ACTION, MSG_TRANSFER,
};

pub const PROXIMITY_SENSOR_ROBOT_TYPE: &str = "proximity_sensor_robot";

pub fn register(builder: &mut TypeRegistryBuilder) -> Result<(), HubError> {
    builder.register(PROXIMITY_SENSOR_ROBOT_TYPE, new_conn_handler)
}

fn new_conn_handler(device_id: &str, ip: &str) -> Result<Arc<dyn ConnHandler>, HubError> {
    let robot = Arc::new(ProximitySensorRobot::new(device_id, ip));
    let handler = Arc::new(BaseRobotHandler::new(robot.clone()));
    let base = BaseConnHandler::new(device_id, ip, handler.clone())?;
    Ok(Arc::new(ProximitySensorConn {
        base,
        handler,
        robot,
    }))
}

pub struct ProximitySensorRobot {
    base: BaseRobotState,
    last_reading: RwLock<Option<f64>>,
}

impl ProximitySensorRobot {
    fn new(device_id: &str, ip: &str) -> Self {
        Self {
            base: BaseRobotState::new(BaseRobot::new(
                device_id,
                ip,
                RobotType::from(PROXIMITY_SENSOR_ROBOT_TYPE),
            )),
            last_reading: RwLock::new(None),
        }
    }

    pub fn last_reading(&self) -> Option<f64> {
        *self.last_reading.read().unwrap()
    }

    fn record_reading(&self, distance: f64) {
        *self.last_reading.write().unwrap() = Some(distance);
        self.base.set_status(status::ACTIVE);
    }
}

impl Robot for ProximitySensorRobot {
    fn snapshot(&self) -> BaseRobot {
        self.base.snapshot()
    }

    fn to_json(&self) -> serde_json::Value {
        let mut json = self.base.to_json();
        if let (Some(obj), Some(reading)) = (json.as_object_mut(), self.last_reading()) {
            obj.insert("last_reading".to_string(), json!(reading));
        }
        json
    }

    fn set_ip(&self, ip: &str) {
        self.base.set_ip(ip);
    }

    fn set_status(&self, status: &str) {
        self.base.set_status(status);
    }

    fn touch(&self, last_seen: i64) {
        self.base.touch(last_seen);
    }
}

pub struct ProximitySensorConn {
    base: BaseConnHandler,
    handler: Arc<BaseRobotHandler>,
    robot: Arc<ProximitySensorRobot>,
}

impl ProximitySensorConn {
    async fn handle(&self, msg: Msg) {
        match msg.msg.as_str() {
            MSG_TRANSFER => self.handle_transfer(msg).await,
            MSG_QUICK_ACTION => {
                tracing::info!(
                    device_id = %self.base.device_id,
                    reading = ?self.robot.last_reading(),
                    "proximity sensor quick action"
                );
                if let Some(reply) = msg.reply {
                    let _ = reply.send(Payload::Json(json!({
                        "last_reading": self.robot.last_reading(),
                    })));
                }
            }
            line => {
                // Wire form: DIST <meters>
                let mut parts = line.split_whitespace();
                if parts.next() == Some("DIST") {
                    if let Some(distance) = parts.next().and_then(|t| t.parse::<f64>().ok()) {
                        self.robot.record_reading(distance);
                        return;
                    }
                }
                tracing::debug!(
                    device_id = %self.base.device_id,
                    msg = %msg.msg,
                    source = %msg.source,
                    "unhandled proximity sensor message"
                );
            }
        }
    }

    /// During a transfer the sensor streams one raw line and expects it
    /// echoed back before the protocol loop resumes.
    async fn handle_transfer(&self, msg: Msg) {
        let Payload::Conn(mut stream) = msg.payload else {
            return;
        };
        let mut line = String::new();
        match stream.reader.read_line(&mut line).await {
            Ok(n) if n > 0 => {
                if let Err(e) = stream.writer.write_all(line.as_bytes()).await {
                    tracing::warn!(device_id = %self.base.device_id, error = %e, "transfer echo failed");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(device_id = %self.base.device_id, error = %e, "transfer read failed");
            }
        }
        if let Some(reply) = msg.reply {
            let _ = reply.send(Payload::Conn(stream));
        }
    }
}

#[async_trait]
impl ConnHandler for ProximitySensorConn {
    async fn start(&self) -> Result<(), HubError> {
        let inbox = self.handler.inbox();
        let disconnect = self.base.disconnect().clone();
        while let Some(msg) = inbox.read(&disconnect).await {
            self.handle(msg).await;
        }
        tracing::debug!(device_id = %self.base.device_id, "proximity sensor drain loop ended");
        Ok(())
    }

    async fn stop(&self) -> Result<(), HubError> {
        self.handler.inbox().close();
        self.base.stop().await
    }

    fn handler(&self) -> Arc<dyn RobotHandler> {
        self.base.handler()
    }

    fn disconnect_token(&self) -> Option<CancellationToken> {
        self.base.disconnect_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_extend_the_json_projection() {
        let robot = ProximitySensorRobot::new("dev-1", "10.0.0.7");
        assert!(robot.to_json().get("last_reading").is_none());

        robot.record_reading(1.25);
        let json = robot.to_json();
        assert_eq!(json["last_reading"], 1.25);
        assert_eq!(json["status"], "active");
    }
}
