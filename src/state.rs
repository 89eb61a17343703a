use std::sync::Arc;

use crate::bus::EventBus;
use crate::db::Store;
use crate::manager::RobotManager;
use crate::sse::EventsGateway;

/// Shared application state passed to all HTTP handlers via the axum State
/// extractor.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RobotManager>,
    pub bus: Arc<EventBus>,
    pub gateway: Arc<EventsGateway>,
    pub store: Arc<dyn Store>,
    /// HS256 signing secret for operator session tokens
    pub jwt_secret: Arc<Vec<u8>>,
    pub operator_user: String,
    pub operator_password: String,
}
