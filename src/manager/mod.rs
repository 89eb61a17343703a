//! Robot manager: registry, lifecycle and message routing for all
//! connected devices, with operator-in-the-loop admission.
//!
//! The manager keeps two synchronized indices (device id -> handler,
//! ip -> handler) under a single RW lock, so readers never observe a
//! half-written insertion, removal or transfer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::{kind, Event, EventBus};
use crate::config::REGISTERING_WAIT_TIMEOUT;
use crate::db::Store;
use crate::error::HubError;
use crate::robot::registry::TypeRegistry;
use crate::robot::{status, ConnHandler, Msg, Robot, RobotHandler, RobotType};
use crate::sync::SafeSet;

/// A pending admission: the triple a device declared in its `REGISTER`
/// line, tracked from the first line until the operator decides or the
/// wait times out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisteringRobot {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    pub robot_type: RobotType,
}

impl RegisteringRobot {
    /// Name of the decision event the operator's accept/reject fires.
    pub fn decision_event(&self) -> String {
        kind::register_decision(&self.device_id, &self.ip, self.robot_type.as_str())
    }
}

/// Successful outcomes of [`RobotManager::add_robot`]. A transfer is the
/// same device reappearing on a new address; treating it as an error is a
/// caller bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Added,
    Transferred,
}

#[derive(Default)]
struct Indices {
    by_id: HashMap<String, Arc<dyn RobotHandler>>,
    by_ip: HashMap<String, Arc<dyn RobotHandler>>,
}

pub struct RobotManager {
    indices: RwLock<Indices>,
    registering: SafeSet<RegisteringRobot>,
    bus: Arc<EventBus>,
    store: Arc<dyn Store>,
    registry: TypeRegistry,
    main_token: CancellationToken,
    registering_wait: Duration,
}

impl RobotManager {
    pub fn new(
        bus: Arc<EventBus>,
        store: Arc<dyn Store>,
        registry: TypeRegistry,
        main_token: CancellationToken,
    ) -> Self {
        Self {
            indices: RwLock::new(Indices::default()),
            registering: SafeSet::new(),
            bus,
            store,
            registry,
            main_token,
            registering_wait: REGISTERING_WAIT_TIMEOUT,
        }
    }

    /// Shorten the admission wait; used by tests.
    pub fn with_registering_wait(mut self, wait: Duration) -> Self {
        self.registering_wait = wait;
        self
    }

    /// Admission and startup workflow for a device's `REGISTER`.
    ///
    /// Publishes the pending-admission event, waits for the operator's
    /// decision (or timeout, or hub shutdown), then builds the handler
    /// triad, indexes it, and wires its lifecycle tasks.
    pub async fn register_robot(
        self: &Arc<Self>,
        device_id: &str,
        ip: &str,
        robot_type: &RobotType,
    ) -> Result<(), HubError> {
        if device_id.is_empty() || ip.is_empty() {
            return Err(HubError::InvalidInput);
        }
        if robot_type.as_str().is_empty() {
            return Err(HubError::InvalidRobotType);
        }
        let factory = self
            .registry
            .get(robot_type)
            .ok_or(HubError::NoRobotTypeConnHandler)?;

        tracing::info!(device_id, ip, robot_type = %robot_type, "robot awaiting admission");
        if !self.await_admission(device_id, ip, robot_type).await {
            tracing::info!(device_id, ip, "robot registration not accepted");
            return Err(HubError::RobotNotAccepted);
        }

        let conn = factory(device_id, ip).map_err(|e| {
            tracing::warn!(device_id, error = %e, "connection handler construction failed");
            HubError::CreateConnHandler
        })?;

        match self.add_robot(device_id, ip, conn.handler())? {
            Admission::Transferred => {
                // the resident triad stays; the freshly built one is dropped
                tracing::info!(device_id, ip, "robot transferred to new address");
                return Ok(());
            }
            Admission::Added => {}
        }

        let Some(disconnect) = conn.disconnect_token() else {
            let _ = self.remove_robot(Some(device_id), Some(ip));
            return Err(HubError::NoDisconnectChannel);
        };

        self.spawn_lifecycle(device_id, conn, disconnect);
        tracing::info!(device_id, ip, "robot registered");
        Ok(())
    }

    async fn await_admission(&self, device_id: &str, ip: &str, robot_type: &RobotType) -> bool {
        let reg = RegisteringRobot {
            device_id: device_id.to_string(),
            ip: ip.to_string(),
            robot_type: robot_type.clone(),
        };
        let decision_event = reg.decision_event();

        let (tx, mut rx) = mpsc::channel::<bool>(1);
        let subscriber = self.bus.subscribe(
            &decision_event,
            None,
            Arc::new(move |event: Event| {
                let accepted = event.data.as_bool().unwrap_or(false);
                let _ = tx.try_send(accepted);
            }),
        );

        self.registering.add(reg.clone());
        self.bus
            .publish(Event::new(
                kind::REGISTERING_ROBOT,
                serde_json::to_value(&reg).unwrap_or(Value::Null),
            ))
            .await;

        let accepted = tokio::select! {
            decision = rx.recv() => decision.unwrap_or(false),
            _ = self.main_token.cancelled() => false,
            _ = tokio::time::sleep(self.registering_wait) => false,
        };

        self.bus.unsubscribe(&decision_event, &subscriber);
        self.registering.remove(&reg);
        accepted
    }

    /// Index a handler under both identifiers, resolving conflicts:
    /// an address held by a *different* device evicts the prior robot and
    /// retries; a known device on a *new* address is rebound in place
    /// (transfer); a full duplicate is an error.
    pub fn add_robot(
        &self,
        device_id: &str,
        ip: &str,
        handler: Arc<dyn RobotHandler>,
    ) -> Result<Admission, HubError> {
        loop {
            {
                let mut idx = self.indices.write().unwrap();
                match idx.by_ip.get(ip) {
                    Some(resident) if resident.device_id() != device_id => {
                        // different device squatting on this address: evict
                        // below (outside the lock) and retry
                    }
                    Some(_) => return Err(HubError::RobotAlreadyExists),
                    None => {
                        if let Some(existing) = idx.by_id.get(device_id).cloned() {
                            let old_ip = existing.ip();
                            existing.robot().set_ip(ip);
                            idx.by_ip.remove(&old_ip);
                            idx.by_ip.insert(ip.to_string(), Arc::clone(&existing));
                            self.persist(existing.robot().snapshot());
                            return Ok(Admission::Transferred);
                        }
                        idx.by_id.insert(device_id.to_string(), Arc::clone(&handler));
                        idx.by_ip.insert(ip.to_string(), Arc::clone(&handler));
                        self.persist(handler.robot().snapshot());
                        return Ok(Admission::Added);
                    }
                }
            }
            // eviction re-acquires the write lock itself; the set of
            // competitors for the address strictly shrinks, so this
            // terminates
            let _ = self.remove_robot(None, Some(ip));
        }
    }

    /// Drop a robot by device id, ip, or both (both must then agree).
    /// All paths cancel the handler's disconnect token.
    pub fn remove_robot(
        &self,
        device_id: Option<&str>,
        ip: Option<&str>,
    ) -> Result<(), HubError> {
        let handler = {
            let mut idx = self.indices.write().unwrap();
            match (device_id, ip) {
                (None, None) => return Err(HubError::InvalidInput),
                (Some(id), Some(ip)) => match (idx.by_id.get(id), idx.by_ip.get(ip)) {
                    (Some(a), Some(b)) if Arc::ptr_eq(a, b) => {
                        let handler = Arc::clone(a);
                        idx.by_id.remove(id);
                        idx.by_ip.remove(ip);
                        handler
                    }
                    (None, None) => return Err(HubError::RobotNotFound),
                    _ => return Err(HubError::RobotMismatch),
                },
                (Some(id), None) => {
                    let Some(handler) = idx.by_id.remove(id) else {
                        return Err(HubError::RobotNotFound);
                    };
                    idx.by_ip.remove(&handler.ip());
                    handler
                }
                (None, Some(ip)) => {
                    let Some(handler) = idx.by_ip.remove(ip) else {
                        return Err(HubError::RobotNotFound);
                    };
                    idx.by_id.remove(&handler.device_id());
                    handler
                }
            }
        };

        if let Some(token) = handler.disconnect_token() {
            token.cancel();
        }
        let robot = handler.robot();
        robot.set_status(status::OFFLINE);
        self.persist(robot.snapshot());
        tracing::debug!(device_id = %handler.device_id(), "robot removed");
        Ok(())
    }

    pub fn get_robot(
        &self,
        device_id: Option<&str>,
        ip: Option<&str>,
    ) -> Result<Arc<dyn Robot>, HubError> {
        Ok(self.get_handler(device_id, ip)?.robot())
    }

    pub fn get_handler(
        &self,
        device_id: Option<&str>,
        ip: Option<&str>,
    ) -> Result<Arc<dyn RobotHandler>, HubError> {
        let idx = self.indices.read().unwrap();
        Self::lookup(&idx, device_id, ip)
    }

    /// Locate and enqueue; does not wait for the robot to process.
    pub fn send_message(
        &self,
        device_id: Option<&str>,
        ip: Option<&str>,
        msg: Msg,
    ) -> Result<(), HubError> {
        self.get_handler(device_id, ip)?.send_msg(msg)
    }

    fn lookup(
        idx: &Indices,
        device_id: Option<&str>,
        ip: Option<&str>,
    ) -> Result<Arc<dyn RobotHandler>, HubError> {
        match (device_id, ip) {
            (None, None) => Err(HubError::InvalidInput),
            (Some(id), Some(ip)) => match (idx.by_id.get(id), idx.by_ip.get(ip)) {
                (Some(a), Some(b)) if Arc::ptr_eq(a, b) => Ok(Arc::clone(a)),
                (None, None) => Err(HubError::RobotNotFound),
                _ => Err(HubError::RobotMismatch),
            },
            (Some(id), None) => idx.by_id.get(id).cloned().ok_or(HubError::RobotNotFound),
            (None, Some(ip)) => idx.by_ip.get(ip).cloned().ok_or(HubError::RobotNotFound),
        }
    }

    pub fn get_robots(&self) -> Vec<Arc<dyn Robot>> {
        let idx = self.indices.read().unwrap();
        idx.by_id.values().map(|h| h.robot()).collect()
    }

    pub fn get_handlers(&self) -> Vec<Arc<dyn RobotHandler>> {
        let idx = self.indices.read().unwrap();
        idx.by_id.values().cloned().collect()
    }

    pub fn get_device_ids(&self) -> Vec<String> {
        let idx = self.indices.read().unwrap();
        idx.by_id.keys().cloned().collect()
    }

    pub fn get_ips(&self) -> Vec<String> {
        let idx = self.indices.read().unwrap();
        idx.by_ip.keys().cloned().collect()
    }

    pub fn get_registering_robots(&self) -> Vec<RegisteringRobot> {
        self.registering.iter().collect()
    }

    /// Run the connection handler to completion, and supervise it: hub
    /// shutdown or the disconnect token tears the robot down exactly once.
    fn spawn_lifecycle(
        self: &Arc<Self>,
        device_id: &str,
        conn: Arc<dyn ConnHandler>,
        disconnect: CancellationToken,
    ) {
        let runner_conn = Arc::clone(&conn);
        let runner_token = disconnect.clone();
        let runner_id = device_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = runner_conn.start().await {
                tracing::warn!(device_id = %runner_id, error = %e, "connection handler exited with error");
            }
            runner_token.cancel();
        });

        let manager = Arc::clone(self);
        let main_token = self.main_token.clone();
        let device_id = device_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = main_token.cancelled() => disconnect.cancel(),
                _ = disconnect.cancelled() => {}
            }
            if let Err(e) = conn.stop().await {
                tracing::warn!(device_id = %device_id, error = %e, "connection handler stop failed");
            }
            match manager.remove_robot(Some(&device_id), None) {
                // eviction and shutdown paths may have removed it already
                Ok(()) | Err(HubError::RobotNotFound) => {}
                Err(e) => {
                    tracing::warn!(device_id = %device_id, error = %e, "robot teardown failed")
                }
            }
        });
    }

    fn persist(&self, snapshot: crate::robot::BaseRobot) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let result = if snapshot.status == status::OFFLINE {
                store.remove_robot(&snapshot.device_id, &snapshot).await
            } else {
                store.upsert_robot(&snapshot).await
            };
            if let Err(e) = result {
                tracing::warn!(device_id = %snapshot.device_id, error = %e, "robot persistence failed");
            }
        });
    }
}

#[cfg(test)]
mod tests;
