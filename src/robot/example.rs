//! Minimal robot type demonstrating the default triad behavior. Useful as
//! a template for new robot modules and as a fixture in tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::HubError;

use super::registry::TypeRegistryBuilder;
use super::{
    BaseConnHandler, BaseRobot, BaseRobotHandler, BaseRobotState, ConnHandler, Payload,
    RobotHandler, RobotType, MSG_TRANSFER,
};

pub const EXAMPLE_ROBOT_TYPE: &str = "example_robot";

pub fn register(builder: &mut TypeRegistryBuilder) -> Result<(), HubError> {
    builder.register(EXAMPLE_ROBOT_TYPE, new_conn_handler)
}

fn new_conn_handler(device_id: &str, ip: &str) -> Result<Arc<dyn ConnHandler>, HubError> {
    let robot = Arc::new(BaseRobotState::new(BaseRobot::new(
        device_id,
        ip,
        RobotType::from(EXAMPLE_ROBOT_TYPE),
    )));
    let handler = Arc::new(BaseRobotHandler::new(robot));
    let base = BaseConnHandler::new(device_id, ip, handler.clone())?;
    Ok(Arc::new(ExampleConn { base, handler }))
}

pub struct ExampleConn {
    base: BaseConnHandler,
    handler: Arc<BaseRobotHandler>,
}

#[async_trait]
impl ConnHandler for ExampleConn {
    async fn start(&self) -> Result<(), HubError> {
        let inbox = self.handler.inbox();
        let disconnect = self.base.disconnect().clone();
        while let Some(msg) = inbox.read(&disconnect).await {
            // relinquish transfers untouched; log everything else
            if msg.msg == MSG_TRANSFER {
                if let (Payload::Conn(stream), Some(reply)) = (msg.payload, msg.reply) {
                    let _ = reply.send(Payload::Conn(stream));
                }
                continue;
            }
            tracing::debug!(device_id = %self.base.device_id, msg = %msg.msg, "example robot message");
        }
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
