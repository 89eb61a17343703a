//! Robot REST endpoints: fleet listing, per-robot detail and actions, and
//! the operator's admission decision.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::bus::Event;
use crate::error::HubError;
use crate::http::auth::Session;
use crate::manager::RegisteringRobot;
use crate::robot::{source, Msg};
use crate::state::AppState;

/// GET /robot - JSON array of robot projections.
pub async fn list_robots(_session: Session, State(state): State<AppState>) -> Json<Vec<Value>> {
    let robots = state
        .manager
        .get_robots()
        .iter()
        .map(|r| r.to_json())
        .collect();
    Json(robots)
}

/// GET /robot/robot/{id} - one robot's projection, or 404.
pub async fn get_robot(
    _session: Session,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, HubError> {
    let robot = state.manager.get_robot(Some(&id), None)?;
    Ok(Json(robot.to_json()))
}

/// POST /robot/robot/{id} - forward the body to the robot's own handler.
pub async fn post_robot(
    _session: Session,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, HubError> {
    let handler = state.manager.get_handler(Some(&id), None)?;
    handler.send_msg(Msg::with_json("POST", source::HTTP_SERVER, body))?;
    Ok(Json(json!({"status": "accepted", "robot": id})))
}

/// GET /robot/robot/{id}/quick_action - trigger the handler's quick action.
pub async fn quick_action(
    _session: Session,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, HubError> {
    let handler = state.manager.get_handler(Some(&id), None)?;

    handler.quick_action();
    Ok(Json(json!({
        "status": "Quick action performed successfully",
        "robot": handler.device_id(),
    })))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterDecisionRequest {
    pub registering_robot: RegisteringRobot,
    /// "yes" accepts the pending admission; anything else rejects it.
    pub accept: String,
}

/// POST /robot/register - publish the operator's decision for a pending
/// admission. The decision event is named after the embedded triple, so it
/// unblocks exactly the matching registration wait.
pub async fn decide_registration(
    _session: Session,
    State(state): State<AppState>,
    Json(req): Json<RegisterDecisionRequest>,
) -> Json<Value> {
    let accepted = req.accept == "yes";
    state
        .bus
        .publish(Event::new(
            req.registering_robot.decision_event(),
            json!(accepted),
        ))
        .await;

    tracing::info!(
        device_id = %req.registering_robot.device_id,
        accepted,
        "operator decided a pending admission"
    );
    Json(json!({"status": "decision published", "accepted": accepted}))
}
