//! Endpoints called by the displays themselves.
//!
//! Every route except provisioning runs behind `require_device`, which puts
//! the caller's `DeviceIdentity` into the request extensions.

use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use signage_core::pairing;
use signage_gateway::connection;
use signage_types::api::{
    DeviceLogRequest, HeartbeatRequest, HeartbeatResponse, PlaylistDetail, ProvisionResponse,
};
use signage_types::events::{ChangeAction, Table};
use signage_types::models::{Command, DisplayLog, Screenshot};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{DeviceIdentity, PROVISION_TOKEN_HEADER, hash_device_key};
use crate::playlists;

const DEVICE_KEY_BYTES: usize = 32;
const DEFAULT_DISPLAY_NAME: &str = "New display";
const SCREENSHOT_PREFIX: &str = "screenshots";

#[derive(Debug, Deserialize)]
pub struct ProvisionQuery {
    pub name: Option<String>,
}

fn generate_device_key() -> String {
    let mut bytes = [0u8; DEVICE_KEY_BYTES];
    rand::rng().fill(&mut bytes[..]);
    B64.encode(bytes)
}

fn notify(state: &AppState, device: &DeviceIdentity, table: Table, action: ChangeAction, id: Uuid) {
    if let Some(owner) = device.owner_id {
        state.dispatcher.notify_change(owner, table, action, id);
    }
}

/// POST /device/provision: register a factory-fresh display.
pub async fn provision(
    State(state): State<AppState>,
    Query(query): Query<ProvisionQuery>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let Some(expected) = state.settings.provision_token.as_deref() else {
        return Err(ApiError::Forbidden);
    };
    let presented = headers
        .get(PROVISION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if presented != expected {
        return Err(ApiError::Unauthorized);
    }

    let name = query
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());
    let display_id = Uuid::new_v4();
    let device_key = generate_device_key();
    let key_hash = hash_device_key(&device_key);

    let pairing_code = state
        .with_db(move |db| {
            db.provision_display(&display_id.to_string(), &name, &key_hash, || {
                pairing::generate_code(&mut rand::rng())
            })
        })
        .await?;

    info!("Provisioned display {} with pairing code {}", display_id, pairing_code);
    Ok((
        StatusCode::CREATED,
        Json(ProvisionResponse {
            display_id,
            pairing_code,
            device_key,
        }),
    ))
}

/// POST /device/heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(device): Extension<DeviceIdentity>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<Json<HeartbeatResponse>> {
    let id = device.display_id;
    let status = req.status;
    let recorded = state
        .with_db(move |db| db.record_heartbeat(&id.to_string(), status))
        .await?;
    if !recorded {
        return Err(ApiError::NotFound("display"));
    }

    notify(&state, &device, Table::Displays, ChangeAction::Update, id);
    Ok(Json(HeartbeatResponse {
        playlist_id: device.playlist_id,
        server_time: Utc::now(),
    }))
}

/// GET /device/playlist: the assigned playlist, or `null`.
pub async fn playlist(
    State(state): State<AppState>,
    Extension(device): Extension<DeviceIdentity>,
) -> ApiResult<Json<Option<PlaylistDetail>>> {
    let (Some(owner), Some(playlist_id)) = (device.owner_id, device.playlist_id) else {
        return Ok(Json(None));
    };

    let detail = state
        .with_db(move |db| {
            let playlist_id = playlist_id.to_string();
            let Some(playlist) = db.get_playlist(&owner.to_string(), &playlist_id)? else {
                return Ok(None);
            };
            let items = db.playlist_items(&playlist_id)?;
            Ok(Some(playlists::detail(playlist, items)))
        })
        .await?;

    Ok(Json(detail))
}

/// GET /device/commands: pending commands, now marked delivered.
pub async fn commands(
    State(state): State<AppState>,
    Extension(device): Extension<DeviceIdentity>,
) -> ApiResult<Json<Vec<Command>>> {
    let id = device.display_id;
    let commands = state
        .with_db(move |db| db.take_pending_commands(&id.to_string()))
        .await?;

    for command in &commands {
        notify(&state, &device, Table::Commands, ChangeAction::Update, command.id);
    }
    Ok(Json(commands))
}

/// POST /device/commands/{id}/ack
pub async fn ack_command(
    State(state): State<AppState>,
    Path(command_id): Path<Uuid>,
    Extension(device): Extension<DeviceIdentity>,
) -> ApiResult<StatusCode> {
    let id = device.display_id;
    let acked = state
        .with_db(move |db| db.ack_command(&id.to_string(), &command_id.to_string()))
        .await?;
    if !acked {
        return Err(ApiError::NotFound("command"));
    }

    notify(&state, &device, Table::Commands, ChangeAction::Update, command_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /device/logs
pub async fn post_log(
    State(state): State<AppState>,
    Extension(device): Extension<DeviceIdentity>,
    Json(req): Json<DeviceLogRequest>,
) -> ApiResult<(StatusCode, Json<DisplayLog>)> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("message is required"));
    }

    let display_id = device.display_id;
    let log_id = Uuid::new_v4();
    let log = state
        .with_db(move |db| db.insert_log(&log_id.to_string(), &display_id.to_string(), req.kind, &req.message))
        .await?;

    notify(&state, &device, Table::DisplayLogs, ChangeAction::Insert, log.id);
    Ok((StatusCode::CREATED, Json(log)))
}

/// POST /device/screenshots: the raw body is the image.
pub async fn post_screenshot(
    State(state): State<AppState>,
    Extension(device): Extension<DeviceIdentity>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<(StatusCode, Json<Screenshot>)> {
    let ext = match headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some("image/jpeg") => "jpg",
        Some("image/webp") => "webp",
        _ => "png",
    };
    let file_name = format!("{}.{}", device.display_id, ext);

    let stored = state
        .storage
        .put(SCREENSHOT_PREFIX, &file_name, body.into_data_stream(), state.settings.max_upload_bytes)
        .await?;

    let display_id = device.display_id;
    let shot_id = Uuid::new_v4();
    let row = stored.clone();
    let inserted = state
        .with_db(move |db| db.insert_screenshot(&shot_id.to_string(), &display_id.to_string(), &row.path, &row.url))
        .await;

    let screenshot = match inserted {
        Ok(shot) => shot,
        Err(e) => {
            state.storage.delete_all(&[stored.path]).await;
            return Err(e);
        }
    };

    notify(&state, &device, Table::DisplayScreenshots, ChangeAction::Insert, screenshot.id);
    Ok((StatusCode::CREATED, Json(screenshot)))
}

/// GET /device/gateway: WebSocket carrying pushed commands.
///
/// A pushed command stays `pending` until its frame is written, so a command
/// lost with a dying socket is still returned by `GET /device/commands`.
pub async fn gateway(
    State(state): State<AppState>,
    Extension(device): Extension<DeviceIdentity>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    let display_id = device.display_id;
    ws.on_upgrade(move |socket| {
        let on_written = move |command_id: Uuid| {
            let state = state.clone();
            let device = device.clone();
            tokio::spawn(async move { command_written(&state, &device, command_id).await });
        };
        connection::handle_device_connection(socket, dispatcher, display_id, on_written)
    })
}

async fn command_written(state: &AppState, device: &DeviceIdentity, command_id: Uuid) {
    let id = command_id.to_string();
    match state.with_db(move |db| db.mark_command_delivered(&id)).await {
        Ok(true) => notify(state, device, Table::Commands, ChangeAction::Update, command_id),
        Ok(false) => {}
        Err(e) => warn!("Failed to mark command {} delivered: {}", command_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_keys_are_url_safe_and_unique() {
        let a = generate_device_key();
        let b = generate_device_key();
        assert_ne!(a, b);
        assert_eq!(B64.decode(&a).unwrap().len(), DEVICE_KEY_BYTES);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
