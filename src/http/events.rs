//! SSE stream endpoint and dynamic subscription management.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Json,
};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;

use crate::http::auth::Session;
use crate::sse::EventSubscriptionRequest;
use crate::state::AppState;

/// Reconnect delay advertised to EventSource clients.
const RETRY_MILLIS: u64 = 3000;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Comma-separated initial subscription set.
    #[serde(default)]
    pub events: String,
}

/// GET /events?events=a,b,c - open the SSE stream for this session.
///
/// The first frame carries the event session (`__session_id`), the
/// handshake that makes later subscribe/unsubscribe calls addressable.
pub async fn stream(
    session: Session,
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let initial: Vec<String> = query
        .events
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let (_client, frames) = state.gateway.open(session, initial);

    let retry = futures_util::stream::once(async {
        Ok(SseEvent::default().retry(Duration::from_millis(RETRY_MILLIS)))
    });
    let data = ReceiverStream::new(frames).map(|frame| Ok(SseEvent::default().data(frame)));

    Sse::new(retry.chain(data)).keep_alive(KeepAlive::default())
}

/// POST /events/subscribe - add event types to a live stream.
pub async fn subscribe(
    _session: Session,
    State(state): State<AppState>,
    Json(req): Json<EventSubscriptionRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let client = state
        .gateway
        .get_client(&req.event_session)
        .ok_or((StatusCode::NOT_FOUND, "Client not found".to_string()))?;

    for event_type in &req.event_types {
        client.subscribe_to(&state.bus, event_type);
    }
    Ok(Json(
        json!({"status": "subscribed", "events": req.event_types}),
    ))
}

/// POST /events/unsubscribe - drop event types from a live stream.
pub async fn unsubscribe(
    _session: Session,
    State(state): State<AppState>,
    Json(req): Json<EventSubscriptionRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let client = state
        .gateway
        .get_client(&req.event_session)
        .ok_or((StatusCode::NOT_FOUND, "Client not found".to_string()))?;

    for event_type in &req.event_types {
        client.unsubscribe_from(&state.bus, event_type);
    }
    Ok(Json(
        json!({"status": "unsubscribed", "events": req.event_types}),
    ))
}
