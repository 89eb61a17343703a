//! Operator session gate.
//!
//! The identity subsystem proper lives outside this server; what ships
//! here is the surface the rest of the hub depends on: a login that issues
//! an HS256 session token, a validity check, and the `Session` extractor
//! every protected handler takes. Tokens are accepted from the
//! `Authorization: Bearer` header, the `session-token` cookie, or the
//! `auth-token` query parameter (the SSE stream can only authenticate via
//! query parameter).

use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

/// Session token lifetime: 12 hours.
const TOKEN_TTL_SECS: i64 = 12 * 60 * 60;

/// An authenticated operator session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    sid: String,
    iat: i64,
    exp: i64,
}

impl FromRequestParts<AppState> for Session {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            token_from_parts(parts).ok_or(StatusCode::UNAUTHORIZED)?;

        let validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        let data = jsonwebtoken::decode::<Claims>(
            &token,
            &jsonwebtoken::DecodingKey::from_secret(&state.jwt_secret),
            &validation,
        )
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

        Ok(Session {
            user_id: data.claims.sub,
            session_id: data.claims.sid,
        })
    }
}

fn token_from_parts(parts: &Parts) -> Option<String> {
    // Authorization header first (cross-origin clients)
    if let Some(header) = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
    {
        let token = header.strip_prefix("Bearer ").unwrap_or(header);
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    // session-token cookie (same-origin clients)
    if let Some(cookies) = parts.headers.get("Cookie").and_then(|v| v.to_str().ok()) {
        for cookie in cookies.split(';') {
            if let Some(value) = cookie.trim().strip_prefix("session-token=") {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    // auth-token query parameter (EventSource cannot set headers)
    if let Some(query) = parts.uri.query() {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("auth-token=") {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    None
}

pub fn issue_session_token(
    secret: &[u8],
    user_id: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        sid: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + TOKEN_TTL_SECS,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret),
    )
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /auth/login - exchange operator credentials for a session token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let credentials_ok = !state.operator_password.is_empty()
        && req.username == state.operator_user
        && req.password == state.operator_password;
    if !credentials_ok {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid username or password".to_string(),
        ));
    }

    let token = issue_session_token(&state.jwt_secret, &req.username).map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create session".to_string(),
        )
    })?;

    tracing::info!(user = %req.username, "operator logged in");
    Ok(Json(json!({
        "status": "success",
        "message": "Logged in successfully",
        "token": token,
    })))
}

/// GET /auth - succeeds iff the supplied token is valid.
pub async fn check(_session: Session) -> StatusCode {
    StatusCode::OK
}

/// POST /auth/logout - stateless tokens, so this only confirms the session
/// existed; clients discard the token.
pub async fn logout(session: Session) -> Json<serde_json::Value> {
    tracing::info!(user = %session.user_id, "operator logged out");
    Json(json!({"status": "success", "message": "Logged out successfully"}))
}
