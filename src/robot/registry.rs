//! Robot type registry: type tag -> connection-handler factory.
//!
//! Populated once during startup and frozen; duplicate registration is
//! rejected at build time rather than silently overwritten.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::HubError;

use super::{example, proximity_sensor, ConnHandler, RobotType};

pub type ConnHandlerFactory = fn(&str, &str) -> Result<Arc<dyn ConnHandler>, HubError>;

#[derive(Default)]
pub struct TypeRegistryBuilder {
    factories: HashMap<RobotType, ConnHandlerFactory>,
}

impl TypeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        robot_type: impl Into<RobotType>,
        factory: ConnHandlerFactory,
    ) -> Result<(), HubError> {
        let robot_type = robot_type.into();
        if self.factories.contains_key(&robot_type) {
            return Err(HubError::DuplicateRobotType(robot_type.0));
        }
        self.factories.insert(robot_type, factory);
        Ok(())
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            factories: Arc::new(self.factories),
        }
    }
}

/// Immutable factory table shared across the hub.
#[derive(Clone)]
pub struct TypeRegistry {
    factories: Arc<HashMap<RobotType, ConnHandlerFactory>>,
}

impl TypeRegistry {
    pub fn get(&self, robot_type: &RobotType) -> Option<ConnHandlerFactory> {
        self.factories.get(robot_type).copied()
    }

    pub fn contains(&self, robot_type: &RobotType) -> bool {
        self.factories.contains_key(robot_type)
    }

    pub fn types(&self) -> Vec<RobotType> {
        self.factories.keys().cloned().collect()
    }
}

/// Registry with every robot type this server ships.
pub fn builtin() -> Result<TypeRegistry, HubError> {
    let mut builder = TypeRegistryBuilder::new();
    proximity_sensor::register(&mut builder)?;
    example::register(&mut builder)?;
    Ok(builder.build())
}
