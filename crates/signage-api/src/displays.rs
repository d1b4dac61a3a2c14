use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use signage_core::pairing::{self, PairingError};
use signage_core::presence;
use signage_gateway::dispatcher::Dispatcher;
use signage_types::api::{
    Claims, ClaimDisplayRequest, DisplayDetail, DisplaySummary, SendCommandRequest, UpdateDisplayRequest,
};
use signage_types::events::{ChangeAction, DeviceEvent, Table};
use signage_types::models::{Command, Display, LogKind};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Log entries shown on the display detail page.
const DETAIL_LOG_LIMIT: usize = 50;
const DETAIL_SCREENSHOT_LIMIT: usize = 5;

/// GET /displays: owned displays by name.
pub async fn list_displays(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<DisplaySummary>>> {
    let owner = claims.sub.to_string();
    let rows = state.with_db(move |db| db.list_displays(&owner)).await?;

    let now = Utc::now();
    let window = state.settings.online_window;
    let displays = rows
        .into_iter()
        .map(|(display, playlist_name)| DisplaySummary {
            online: presence::is_online(display.last_seen_at, now, window),
            display,
            playlist_name,
        })
        .collect();

    Ok(Json(displays))
}

/// GET /displays/{id}
pub async fn get_display(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<DisplayDetail>> {
    let owner = claims.sub.to_string();
    let detail = state
        .with_db(move |db| {
            let id = id.to_string();
            let Some(display) = db.get_display(&owner, &id)? else {
                return Ok(None);
            };
            let playlist = match display.playlist_id {
                Some(pid) => db.get_playlist(&owner, &pid.to_string())?,
                None => None,
            };
            let logs = db.recent_logs(&id, DETAIL_LOG_LIMIT)?;
            let screenshots = db.recent_screenshots(&id, DETAIL_SCREENSHOT_LIMIT)?;
            Ok(Some((display, playlist, logs, screenshots)))
        })
        .await?
        .ok_or(ApiError::NotFound("display"))?;

    let (display, playlist, logs, screenshots) = detail;
    let connected = state.dispatcher.is_connected(display.id).await;
    Ok(Json(DisplayDetail {
        online: presence::is_online(display.last_seen_at, Utc::now(), state.settings.online_window),
        connected,
        display,
        playlist,
        logs,
        screenshots,
    }))
}

/// POST /displays/claim: pair an unclaimed display using its code or QR payload.
pub async fn claim_display(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ClaimDisplayRequest>,
) -> ApiResult<Json<Display>> {
    let code = pairing::normalize_code(&req.code)?;
    let owner = claims.sub.to_string();

    let claimed = state
        .with_db(move |db| db.claim_display(&code, &owner))
        .await?
        .ok_or(PairingError::InvalidCode)?;

    let display_id = claimed.id;
    info!("{} ({}) claimed display {}", claims.username, claims.sub, display_id);
    state
        .dispatcher
        .notify_change(claims.sub, Table::Displays, ChangeAction::Update, display_id);

    Ok(Json(claimed))
}

/// PATCH /displays/{id}: rename and/or (re)assign the playlist.
pub async fn update_display(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateDisplayRequest>,
) -> ApiResult<Json<Display>> {
    let name = match req.name {
        Some(name) if name.trim().is_empty() => return Err(ApiError::bad_request("name must not be empty")),
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };
    let playlist_id = req.playlist_id;

    let owner = claims.sub.to_string();
    let display = state
        .with_db(move |db| {
            let id = id.to_string();
            if db.get_display(&owner, &id)?.is_none() {
                return Ok(Err(ApiError::NotFound("display")));
            }
            if let Some(Some(pid)) = playlist_id {
                if db.get_playlist(&owner, &pid.to_string())?.is_none() {
                    return Ok(Err(ApiError::NotFound("playlist")));
                }
            }
            let pid = playlist_id.map(|p| p.map(|p| p.to_string()));
            let updated = db.update_display(&owner, &id, name.as_deref(), pid.as_ref().map(|p| p.as_deref()))?;
            Ok(updated.ok_or(ApiError::NotFound("display")))
        })
        .await??;

    state
        .dispatcher
        .notify_change(claims.sub, Table::Displays, ChangeAction::Update, display.id);
    if playlist_id.is_some() {
        push_playlist(&state.dispatcher, display.id, display.playlist_id).await;
    }

    Ok(Json(display))
}

/// DELETE /displays/{id}
pub async fn delete_display(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let owner = claims.sub.to_string();
    let deleted = state
        .with_db(move |db| db.delete_display(&owner, &id.to_string()))
        .await?;
    if !deleted {
        return Err(ApiError::NotFound("display"));
    }

    info!("{} ({}) deleted display {}", claims.username, claims.sub, id);
    state
        .dispatcher
        .notify_change(claims.sub, Table::Displays, ChangeAction::Delete, id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /displays/{id}/commands: queue a command, log it, and push it if the
/// display is connected. The command is returned as `pending`.
pub async fn send_command(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendCommandRequest>,
) -> ApiResult<impl IntoResponse> {
    let owner = claims.sub.to_string();
    let command_id = Uuid::new_v4();
    let log_id = Uuid::new_v4();
    let payload = req.payload.clone();

    let (command, log) = state
        .with_db(move |db| {
            let display_id = id.to_string();
            if db.get_display(&owner, &display_id)?.is_none() {
                return Ok(None);
            }
            let command = db.insert_command(&command_id.to_string(), &display_id, req.kind, &payload)?;
            let log = db.insert_log(
                &log_id.to_string(),
                &display_id,
                LogKind::Command,
                &format!("Sent command: {}", req.kind.as_str()),
            )?;
            Ok(Some((command, log)))
        })
        .await?
        .ok_or(ApiError::NotFound("display"))?;

    let pushed = deliver(&state.dispatcher, &command).await;

    info!(
        "{} ({}) sent {} to display {} (pushed: {})",
        claims.username,
        claims.sub,
        command.kind.as_str(),
        id,
        pushed
    );
    state
        .dispatcher
        .notify_change(claims.sub, Table::Commands, ChangeAction::Insert, command.id);
    state
        .dispatcher
        .notify_change(claims.sub, Table::DisplayLogs, ChangeAction::Insert, log.id);

    Ok((StatusCode::CREATED, Json(command)))
}

/// Push a command to a connected display. The device gateway marks it
/// delivered once the frame is written; until then it stays pollable.
async fn deliver(dispatcher: &Dispatcher, command: &Command) -> bool {
    let event = DeviceEvent::Command {
        id: command.id,
        kind: command.kind,
        payload: command.payload.clone(),
    };
    dispatcher.send_to_display(command.display_id, event).await
}

pub(crate) async fn push_playlist(dispatcher: &Dispatcher, display_id: Uuid, playlist_id: Option<Uuid>) {
    dispatcher
        .send_to_display(display_id, DeviceEvent::PlaylistAssigned { playlist_id })
        .await;
}
