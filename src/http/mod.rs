//! Operator-facing HTTP surface: REST routes, SSE stream, session gate.

pub mod auth;
pub mod events;
pub mod robot;

use std::time::Duration;

use axum::http::{header, Method, StatusCode};
use axum::routing::{get, post};
use axum::{extract::State, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::HubError;
use crate::state::AppState;

/// Build the full axum Router with all routes and middleware.
///
/// Everything except `/auth/*` and `/health` requires a valid operator
/// session, enforced by the `Session` extractor on each handler.
pub fn build_router(state: AppState) -> Router {
    let robot_routes = Router::new()
        .route("/robot", get(robot::list_robots))
        .route("/robot/register", post(robot::decide_registration))
        .route(
            "/robot/robot/{id}",
            get(robot::get_robot).post(robot::post_robot),
        )
        .route("/robot/robot/{id}/quick_action", get(robot::quick_action));

    let event_routes = Router::new()
        .route("/events", get(events::stream))
        .route("/events/subscribe", post(events::subscribe))
        .route("/events/unsubscribe", post(events::unsubscribe));

    let auth_routes = Router::new()
        .route("/auth", get(auth::check))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout));

    Router::new()
        .merge(robot_routes)
        .merge(event_routes)
        .merge(auth_routes)
        .route("/health", get(health_check))
        .layer(cors_layer())
        .with_state(state)
}

/// Permissive but credential-aware CORS: the request origin is mirrored
/// back instead of `*`, which browsers reject for credentialed requests.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// GET /health - liveness plus a short-deadline store probe.
async fn health_check(
    State(state): State<AppState>,
) -> Result<(StatusCode, &'static str), HubError> {
    match tokio::time::timeout(Duration::from_secs(2), state.store.ping()).await {
        Ok(Ok(())) => Ok((StatusCode::OK, "ok")),
        _ => Err(HubError::StoreUnavailable),
    }
}
