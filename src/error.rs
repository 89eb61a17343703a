//! Application-wide error taxonomy.
//!
//! Errors are grouped by functional area: identity conflicts, lookups,
//! admission, communication, authorization. The TCP protocol surfaces them
//! as `ERROR <CODE>` tokens via [`HubError::wire_code`]; the REST surface
//! maps them to HTTP statuses via `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    // Identity conflicts
    #[error("robot already exists")]
    RobotAlreadyExists,
    #[error("IP address already in use")]
    IpAlreadyInUse,
    #[error("robot mismatch between device id and IP address")]
    RobotMismatch,

    // Lookup failures
    #[error("robot not found")]
    RobotNotFound,
    #[error("invalid input provided")]
    InvalidInput,

    // Admission failures
    #[error("invalid robot type")]
    InvalidRobotType,
    #[error("robot type already registered: {0}")]
    DuplicateRobotType(String),
    #[error("no connection handler for the robot type")]
    NoRobotTypeConnHandler,
    #[error("failed to create connection handler for robot")]
    CreateConnHandler,
    #[error("robot registration was not accepted")]
    RobotNotAccepted,
    #[error("no disconnect channel available for the robot")]
    NoDisconnectChannel,

    // Communication failures
    #[error("message channel is not initialized")]
    MsgChannelUninitialized,
    #[error("unknown message type received")]
    MsgUnknownType,

    // Authorization
    #[error("unauthorized access")]
    Unauthorized,

    // Generic
    #[error("invalid command")]
    InvalidCommand,
    #[error("storage backend unavailable")]
    StoreUnavailable,
}

impl HubError {
    /// Token emitted after `ERROR ` on the robot TCP protocol.
    pub fn wire_code(&self) -> &'static str {
        match self {
            HubError::RobotAlreadyExists => "ROBOT_ALREADY_EXISTS",
            HubError::InvalidRobotType => "INVALID_ROBOT_TYPE",
            HubError::NoRobotTypeConnHandler => "NO_ROBOT_TYPE_CONN_HANDLER",
            HubError::CreateConnHandler => "CREATE_CONN_HANDLER",
            HubError::RobotNotAccepted => "ROBOT_NOT_ACCEPTED",
            HubError::NoDisconnectChannel => "NO_DISCONNECT_CHANNEL",
            HubError::RobotNotFound => "NO_ROBOT_REGISTERED_WITH_IP",
            HubError::InvalidInput | HubError::InvalidCommand => "REGISTER",
            _ => "UNKNOWN",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            HubError::RobotNotFound => StatusCode::NOT_FOUND,
            HubError::Unauthorized => StatusCode::UNAUTHORIZED,
            HubError::InvalidInput | HubError::InvalidCommand | HubError::InvalidRobotType => {
                StatusCode::BAD_REQUEST
            }
            HubError::RobotAlreadyExists
            | HubError::IpAlreadyInUse
            | HubError::RobotMismatch => StatusCode::CONFLICT,
            HubError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
