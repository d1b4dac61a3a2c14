use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use signage_core::picker::{self, DEFAULT_DURATION_SECS};
use signage_core::preview::{self, PreviewPlayer};
use signage_types::api::{
    AddItemRequest, Claims, CreatePlaylistRequest, PlaylistDetail, PreviewResponse, ReorderRequest,
    UpdateItemRequest, UpdatePlaylistRequest,
};
use signage_types::events::{ChangeAction, Table};
use signage_types::models::{Playlist, PlaylistItem};

use crate::auth::AppState;
use crate::displays::push_playlist;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    /// Seconds since the preview started.
    #[serde(default)]
    pub elapsed: u64,
}

fn durations(items: &[PlaylistItem]) -> Vec<u32> {
    items.iter().map(|i| i.duration_seconds).collect()
}

pub(crate) fn detail(playlist: Playlist, items: Vec<PlaylistItem>) -> PlaylistDetail {
    PlaylistDetail {
        total_duration_seconds: preview::total_duration(&durations(&items)),
        playlist,
        items,
    }
}

/// Load an owned playlist with its items, or `None`.
async fn load_detail(state: &AppState, owner: Uuid, id: Uuid) -> ApiResult<Option<PlaylistDetail>> {
    state
        .with_db(move |db| {
            let id = id.to_string();
            let Some(playlist) = db.get_playlist(&owner.to_string(), &id)? else {
                return Ok(None);
            };
            let items = db.playlist_items(&id)?;
            Ok(Some(detail(playlist, items)))
        })
        .await
}

async fn ensure_owned(state: &AppState, owner: Uuid, id: Uuid) -> ApiResult<()> {
    let found = state
        .with_db(move |db| db.get_playlist(&owner.to_string(), &id.to_string()))
        .await?;
    found.map(|_| ()).ok_or(ApiError::NotFound("playlist"))
}

/// Tell the dashboard the item list changed and ask playing displays to refetch.
pub(crate) async fn items_changed(state: &AppState, owner: Uuid, playlist_id: Uuid, action: ChangeAction, id: Uuid) -> ApiResult<()> {
    state
        .dispatcher
        .notify_change(owner, Table::PlaylistItems, action, id);

    let displays = state
        .with_db(move |db| db.displays_with_playlist(&playlist_id.to_string()))
        .await?;
    for display_id in displays {
        push_playlist(&state.dispatcher, display_id, Some(playlist_id)).await;
    }
    Ok(())
}

/// GET /playlists: newest first.
pub async fn list_playlists(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Playlist>>> {
    let owner = claims.sub.to_string();
    let playlists = state.with_db(move |db| db.list_playlists(&owner)).await?;
    Ok(Json(playlists))
}

/// POST /playlists
pub async fn create_playlist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePlaylistRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let description = req
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let id = Uuid::new_v4();
    let owner = claims.sub.to_string();
    let playlist = state
        .with_db(move |db| db.create_playlist(&id.to_string(), &owner, &name, description.as_deref()))
        .await?;

    info!("{} ({}) created playlist {}", claims.username, claims.sub, playlist.id);
    state
        .dispatcher
        .notify_change(claims.sub, Table::Playlists, ChangeAction::Insert, playlist.id);

    Ok((StatusCode::CREATED, Json(playlist)))
}

/// GET /playlists/{id}: playlist, ordered items and total duration.
pub async fn get_playlist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<PlaylistDetail>> {
    load_detail(&state, claims.sub, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("playlist"))
}

/// PATCH /playlists/{id}
pub async fn update_playlist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePlaylistRequest>,
) -> ApiResult<Json<Playlist>> {
    let name = match req.name {
        Some(name) if name.trim().is_empty() => return Err(ApiError::bad_request("name must not be empty")),
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };
    let description = req.description.map(|d| d.trim().to_string());

    let owner = claims.sub.to_string();
    let playlist = state
        .with_db(move |db| db.update_playlist(&owner, &id.to_string(), name.as_deref(), description.as_deref()))
        .await?
        .ok_or(ApiError::NotFound("playlist"))?;

    state
        .dispatcher
        .notify_change(claims.sub, Table::Playlists, ChangeAction::Update, id);
    Ok(Json(playlist))
}

/// DELETE /playlists/{id}: items go with it; displays showing it are unassigned.
pub async fn delete_playlist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let owner = claims.sub.to_string();
    let (deleted, displays) = state
        .with_db(move |db| {
            let id = id.to_string();
            let displays = db.displays_with_playlist(&id)?;
            let deleted = db.delete_playlist(&owner, &id)?;
            Ok((deleted, displays))
        })
        .await?;
    if !deleted {
        return Err(ApiError::NotFound("playlist"));
    }

    info!("{} ({}) deleted playlist {}", claims.username, claims.sub, id);
    state
        .dispatcher
        .notify_change(claims.sub, Table::Playlists, ChangeAction::Delete, id);
    for display_id in displays {
        state
            .dispatcher
            .notify_change(claims.sub, Table::Displays, ChangeAction::Update, display_id);
        push_playlist(&state.dispatcher, display_id, None).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /playlists/{id}/items: append content at the end.
pub async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddItemRequest>,
) -> ApiResult<impl IntoResponse> {
    let duration = picker::clamp_duration(req.duration_seconds.unwrap_or(DEFAULT_DURATION_SECS));
    let owner = claims.sub.to_string();
    let item_id = Uuid::new_v4();
    let content_id = req.content_id;

    let playlist = state
        .with_db(move |db| {
            let playlist_id = id.to_string();
            let Some(playlist) = db.get_playlist(&owner, &playlist_id)? else {
                return Ok(Err(ApiError::NotFound("playlist")));
            };
            if db.get_content(&owner, &content_id.to_string())?.is_none() {
                return Ok(Err(ApiError::NotFound("content")));
            }
            let items = db.add_item(&playlist_id, &item_id.to_string(), &content_id.to_string(), duration)?;
            Ok(Ok(detail(playlist, items)))
        })
        .await??;

    debug!("Added content {} to playlist {} for {}s", content_id, id, duration);
    items_changed(&state, claims.sub, id, ChangeAction::Insert, item_id).await?;

    Ok((StatusCode::CREATED, Json(playlist)))
}

/// PATCH /playlists/{id}/items/{item_id}: change the display duration.
pub async fn update_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateItemRequest>,
) -> ApiResult<Json<PlaylistDetail>> {
    ensure_owned(&state, claims.sub, id).await?;

    let duration = picker::clamp_duration(req.duration_seconds);
    let updated = state
        .with_db(move |db| db.update_item_duration(&id.to_string(), &item_id.to_string(), duration))
        .await?;
    if !updated {
        return Err(ApiError::NotFound("item"));
    }

    items_changed(&state, claims.sub, id, ChangeAction::Update, item_id).await?;
    load_detail(&state, claims.sub, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("playlist"))
}

/// DELETE /playlists/{id}/items/{item_id}: remove and close the gap.
pub async fn remove_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<PlaylistDetail>> {
    ensure_owned(&state, claims.sub, id).await?;

    state
        .with_db(move |db| db.remove_item(&id.to_string(), &item_id.to_string()))
        .await?
        .ok_or(ApiError::NotFound("item"))?;

    items_changed(&state, claims.sub, id, ChangeAction::Delete, item_id).await?;
    load_detail(&state, claims.sub, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("playlist"))
}

/// POST /playlists/{id}/items/reorder: move one item and renumber.
pub async fn reorder_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReorderRequest>,
) -> ApiResult<Json<PlaylistDetail>> {
    ensure_owned(&state, claims.sub, id).await?;

    let (from, to) = (req.from, req.to);
    state
        .with_db(move |db| db.reorder_items(&id.to_string(), from, to))
        .await?;

    debug!("Playlist {}: moved item {} -> {}", id, from, to);
    items_changed(&state, claims.sub, id, ChangeAction::Update, id).await?;
    load_detail(&state, claims.sub, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("playlist"))
}

/// GET /playlists/{id}/preview?elapsed=N: what the preview player shows after N seconds.
pub async fn preview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<PreviewResponse>> {
    let detail = load_detail(&state, claims.sub, id)
        .await?
        .ok_or(ApiError::NotFound("playlist"))?;

    let durations = durations(&detail.items);
    let player = PreviewPlayer::seek(&durations, query.elapsed);

    Ok(Json(PreviewResponse {
        index: player.index(),
        item_count: detail.items.len(),
        progress_seconds: player.progress(),
        remaining_seconds: player.remaining(&durations),
        percent: player.percent(&durations),
        item: detail.items.get(player.index()).cloned(),
    }))
}
