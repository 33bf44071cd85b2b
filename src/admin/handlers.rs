use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::net::ConnectionId;
use crate::relay::{ClientInfo, EngineStopped, Presence, RelayError, RelayStatus, Stats};
use crate::store::MAX_TTL_SECS;

use super::AdminState;

/// Pause length when the request does not name one.
pub const DEFAULT_PAUSE_SECS: u64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Unavailable(#[from] EngineStopped),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match self {
            AdminError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: RelayStatus,
    pub connections: usize,
}

#[derive(Debug, Deserialize)]
pub struct PresenceQuery {
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub channel: String,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct EmergencyRequest {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PauseRequest {
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

pub async fn get_status(State(state): State<AdminState>) -> Result<Json<SystemStatus>, AdminError> {
    let stats = state.relay.stats().await?;
    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: stats.status,
        connections: stats.total_connections,
    }))
}

pub async fn get_stats(State(state): State<AdminState>) -> Result<Json<Stats>, AdminError> {
    Ok(Json(state.relay.stats().await?))
}

pub async fn get_presence(
    State(state): State<AdminState>,
    Query(query): Query<PresenceQuery>,
) -> Result<Json<Presence>, AdminError> {
    Ok(Json(state.relay.presence(query.channel).await?))
}

pub async fn get_client(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<ClientInfo>, AdminError> {
    let client_id = ConnectionId::parse(&id)
        .ok_or_else(|| AdminError::BadRequest(format!("invalid client id: {id}")))?;

    match state.relay.client_info(client_id).await? {
        Ok(info) => Ok(Json(info)),
        Err(e @ RelayError::TargetNotFound(_)) => Err(AdminError::NotFound(e.to_string())),
        Err(e) => Err(AdminError::BadRequest(e.to_string())),
    }
}

pub async fn post_broadcast(
    State(state): State<AdminState>,
    Json(request): Json<BroadcastRequest>,
) -> Result<Json<Value>, AdminError> {
    let event = request.event.unwrap_or_else(|| "message".to_string());
    let data = request.data.unwrap_or_else(|| json!({}));
    let queued = state
        .relay
        .broadcast(request.channel.clone(), event.clone(), data)
        .await?;

    tracing::info!(channel = %request.channel, event = %event, queued, "Admin broadcast");
    Ok(Json(json!({ "channel": request.channel, "event": event, "queued": queued })))
}

pub async fn post_emergency(
    State(state): State<AdminState>,
    Json(request): Json<EmergencyRequest>,
) -> Result<Json<Value>, AdminError> {
    let recipients = state.relay.emergency(request.message).await?;
    Ok(Json(json!({ "recipients": recipients })))
}

/// Body is optional; an empty body pauses for [`DEFAULT_PAUSE_SECS`].
pub async fn post_pause(
    State(state): State<AdminState>,
    body: Bytes,
) -> Result<Json<Value>, AdminError> {
    let request: PauseRequest = if body.iter().all(u8::is_ascii_whitespace) {
        PauseRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AdminError::BadRequest(e.to_string()))?
    };

    let ttl_secs = request.ttl_secs.unwrap_or(DEFAULT_PAUSE_SECS);
    if ttl_secs == 0 || ttl_secs > MAX_TTL_SECS {
        return Err(AdminError::BadRequest(format!(
            "ttl_secs must be between 1 and {MAX_TTL_SECS}"
        )));
    }
    state.relay.pause(Duration::from_secs(ttl_secs)).await?;
    Ok(Json(json!({ "paused": true, "ttl_secs": ttl_secs })))
}

pub async fn delete_pause(State(state): State<AdminState>) -> Result<Json<Value>, AdminError> {
    state.relay.resume().await?;
    Ok(Json(json!({ "paused": false })))
}
