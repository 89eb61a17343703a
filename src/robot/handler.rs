use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::HubError;
use crate::sync::SafeQueue;

use super::msg::{Msg, MSG_QUICK_ACTION};
use super::{source, Robot};

/// Message handler: owns a robot's inbound queue and routing primitives.
pub trait RobotHandler: Send + Sync {
    fn robot(&self) -> Arc<dyn Robot>;

    /// Enqueue a message for asynchronous processing. Never waits.
    fn send_msg(&self, msg: Msg) -> Result<(), HubError>;

    fn device_id(&self) -> String {
        self.robot().snapshot().device_id
    }

    fn ip(&self) -> String {
        self.robot().snapshot().ip
    }

    /// The robot's teardown signal. A handler built without one is a
    /// programmer error the manager rejects at registration time.
    fn disconnect_token(&self) -> Option<CancellationToken>;

    /// Immediate status-check style action, invoked from the REST surface.
    fn quick_action(&self);
}

impl std::fmt::Debug for dyn RobotHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RobotHandler(device_id={}, ip={})",
            self.device_id(),
            self.ip()
        )
    }
}

/// Default message handler. Concrete robot types usually use it as-is and
/// keep their behavior in the connection handler's drain loop.
pub struct BaseRobotHandler {
    robot: Arc<dyn Robot>,
    inbox: Arc<SafeQueue<Msg>>,
    disconnect: CancellationToken,
}

impl BaseRobotHandler {
    pub fn new(robot: Arc<dyn Robot>) -> Self {
        Self {
            robot,
            inbox: Arc::new(SafeQueue::new()),
            disconnect: CancellationToken::new(),
        }
    }

    pub fn inbox(&self) -> Arc<SafeQueue<Msg>> {
        Arc::clone(&self.inbox)
    }

    pub fn disconnect(&self) -> CancellationToken {
        self.disconnect.clone()
    }
}

impl RobotHandler for BaseRobotHandler {
    fn robot(&self) -> Arc<dyn Robot> {
        Arc::clone(&self.robot)
    }

    fn send_msg(&self, msg: Msg) -> Result<(), HubError> {
        if self.inbox.is_closed() {
            return Err(HubError::MsgChannelUninitialized);
        }
        self.robot.touch(chrono::Utc::now().timestamp());
        self.inbox.enqueue(msg);
        Ok(())
    }

    fn disconnect_token(&self) -> Option<CancellationToken> {
        Some(self.disconnect.clone())
    }

    fn quick_action(&self) {
        let _ = self.send_msg(Msg::new(MSG_QUICK_ACTION, source::HTTP_SERVER));
    }
}

/// Connection handler: owns the device session's I/O lifecycle.
///
/// `start` is the long-running drain loop, expected to run until the
/// disconnect token fires. `stop` must be safe to call repeatedly.
#[async_trait]
pub trait ConnHandler: Send + Sync {
    async fn start(&self) -> Result<(), HubError>;
    async fn stop(&self) -> Result<(), HubError>;
    fn handler(&self) -> Arc<dyn RobotHandler>;
    fn disconnect_token(&self) -> Option<CancellationToken>;
}

/// Default connection lifecycle: park until disconnected. Concrete types
/// compose this and replace `start` with their own drain loop.
pub struct BaseConnHandler {
    pub device_id: String,
    pub ip: String,
    handler: Arc<dyn RobotHandler>,
    disconnect: CancellationToken,
}

impl BaseConnHandler {
    pub fn new(
        device_id: &str,
        ip: &str,
        handler: Arc<dyn RobotHandler>,
    ) -> Result<Self, HubError> {
        let disconnect = handler
            .disconnect_token()
            .ok_or(HubError::NoDisconnectChannel)?;
        Ok(Self {
            device_id: device_id.to_string(),
            ip: ip.to_string(),
            handler,
            disconnect,
        })
    }

    pub fn disconnect(&self) -> &CancellationToken {
        &self.disconnect
    }
}

#[async_trait]
impl ConnHandler for BaseConnHandler {
    async fn start(&self) -> Result<(), HubError> {
        self.disconnect.cancelled().await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), HubError> {
        self.disconnect.cancel();
        Ok(())
    }

    fn handler(&self) -> Arc<dyn RobotHandler> {
        Arc::clone(&self.handler)
    }

    fn disconnect_token(&self) -> Option<CancellationToken> {
        Some(self.disconnect.clone())
    }
}
