//! Persistence boundary.
//!
//! Durable state (robot registrations, sensor readings) lives behind the
//! [`Store`] trait; the hub only ever talks to this interface. The MongoDB
//! handler implementing it against the `robots` and `sensor_data`
//! collections is an external collaborator configured via `MONGODB_URI` /
//! `MONGODB_DATABASE`. [`MemoryStore`] is the in-process implementation
//! used when no backend is wired up, and by the test suite.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HubError;
use crate::robot::BaseRobot;
use crate::sync::SafeMap;

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or refresh a robot registration document.
    async fn upsert_robot(&self, robot: &BaseRobot) -> Result<(), HubError>;

    /// Record that a robot left the fleet (keeps the document, final state).
    async fn remove_robot(&self, device_id: &str, last_state: &BaseRobot)
        -> Result<(), HubError>;

    /// Append a sensor reading for a device.
    async fn insert_sensor_data(&self, device_id: &str, data: Value) -> Result<(), HubError>;

    /// Cheap health probe; callers wrap it in a short local timeout.
    async fn ping(&self) -> Result<(), HubError>;
}

/// In-memory store standing in for the external database handler.
pub struct MemoryStore {
    robots: SafeMap<String, BaseRobot>,
    sensor_data: SafeMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            robots: SafeMap::new(),
            sensor_data: SafeMap::new(),
        }
    }

    pub fn shared() -> Arc<dyn Store> {
        Arc::new(Self::new())
    }

    pub fn robot(&self, device_id: &str) -> Option<BaseRobot> {
        self.robots.get(&device_id.to_string())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_robot(&self, robot: &BaseRobot) -> Result<(), HubError> {
        self.robots.set(robot.device_id.clone(), robot.clone());
        Ok(())
    }

    async fn remove_robot(
        &self,
        device_id: &str,
        last_state: &BaseRobot,
    ) -> Result<(), HubError> {
        self.robots.set(device_id.to_string(), last_state.clone());
        Ok(())
    }

    async fn insert_sensor_data(&self, device_id: &str, data: Value) -> Result<(), HubError> {
        let mut readings = self
            .sensor_data
            .get(&device_id.to_string())
            .unwrap_or_default();
        readings.push(data);
        self.sensor_data.set(device_id.to_string(), readings);
        Ok(())
    }

    async fn ping(&self) -> Result<(), HubError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::{status, RobotType};
    use serde_json::json;

    #[tokio::test]
    async fn upsert_and_final_state_round_trip() {
        let store = MemoryStore::new();
        let mut robot = BaseRobot::new("dev-1", "10.0.0.7", RobotType::from("example_robot"));

        store.upsert_robot(&robot).await.unwrap();
        assert_eq!(store.robot("dev-1").unwrap().status, status::ONLINE);

        robot.status = status::OFFLINE.to_string();
        store.remove_robot("dev-1", &robot).await.unwrap();
        assert_eq!(store.robot("dev-1").unwrap().status, status::OFFLINE);
    }

    #[tokio::test]
    async fn sensor_data_appends_per_device() {
        let store = MemoryStore::new();
        store
            .insert_sensor_data("dev-1", json!({"distance": 1.0}))
            .await
            .unwrap();
        store
            .insert_sensor_data("dev-1", json!({"distance": 2.0}))
            .await
            .unwrap();

        let readings = store.sensor_data.get(&"dev-1".to_string()).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[1], json!({"distance": 2.0}));
        store.ping().await.unwrap();
    }
}
