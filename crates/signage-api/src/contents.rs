use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use signage_core::media;
use signage_core::picker::{self, Breadcrumb, SortKey};
use signage_db::models::{NewContent, RemovedMedia};
use signage_types::api::{BrowseResponse, Claims, CreateFolderRequest};
use signage_types::events::{ChangeAction, Table};
use signage_types::models::{Content, ContentFolder};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::playlists::items_changed;

/// Storage prefix for uploaded content.
const CONTENT_PREFIX: &str = "contents";

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    pub folder_id: Option<Uuid>,
    #[serde(default)]
    pub search: String,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: String,
}

/// GET /folders: every owned folder by name.
pub async fn list_folders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ContentFolder>>> {
    let owner = claims.sub.to_string();
    let folders = state.with_db(move |db| db.list_folders(&owner)).await?;
    Ok(Json(folders))
}

/// POST /folders
pub async fn create_folder(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateFolderRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let owner = claims.sub.to_string();
    let id = Uuid::new_v4();
    let parent_id = req.parent_id;
    let folder = state
        .with_db(move |db| {
            let parent = parent_id.map(|p| p.to_string());
            if let Some(parent) = &parent {
                if db.get_folder(&owner, parent)?.is_none() {
                    return Ok(Err(ApiError::NotFound("folder")));
                }
            }
            Ok(Ok(db.create_folder(&id.to_string(), &owner, &name, parent.as_deref())?))
        })
        .await??;

    state
        .dispatcher
        .notify_change(claims.sub, Table::ContentFolders, ChangeAction::Insert, folder.id);
    Ok((StatusCode::CREATED, Json(folder)))
}

/// DELETE /folders/{id}: the folder, its subfolders and every content inside.
pub async fn delete_folder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let owner = claims.sub.to_string();
    let removed = state
        .with_db(move |db| db.delete_folder(&owner, &id.to_string()))
        .await?
        .ok_or(ApiError::NotFound("folder"))?;

    info!(
        "{} ({}) deleted folder {} with {} objects",
        claims.username,
        claims.sub,
        id,
        removed.storage_paths.len()
    );
    state
        .dispatcher
        .notify_change(claims.sub, Table::ContentFolders, ChangeAction::Delete, id);
    media_removed(&state, claims.sub, removed).await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /browse?folder_id=&search=&sort=: one page of the content picker.
pub async fn browse(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<BrowseResponse>> {
    let sort = match query.sort.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<SortKey>()
                .map_err(|_| ApiError::bad_request(format!("unknown sort key '{}'", raw)))?,
        ),
    };

    let owner = claims.sub.to_string();
    let folder = query.folder_id;
    let (crumb, folders, contents) = state
        .with_db(move |db| {
            let Some(folder) = folder else {
                return Ok(Some((Breadcrumb::new(), db.child_folders(&owner, None)?, Vec::new())));
            };
            let folder = folder.to_string();
            let ancestors = db.folder_path(&owner, &folder)?;
            if ancestors.is_empty() {
                return Ok(None);
            }
            let crumb = Breadcrumb::from_ancestors(&ancestors);
            let folders = db.child_folders(&owner, Some(&folder))?;
            let contents = db.folder_contents(&owner, &folder)?;
            Ok(Some((crumb, folders, contents)))
        })
        .await?
        .ok_or(ApiError::NotFound("folder"))?;

    let (folders, contents) = picker::filter_and_sort(folders, contents, &query.search, sort);
    Ok(Json(BrowseResponse {
        folder_id: crumb.current(),
        path: crumb.into_path(),
        folders,
        contents,
    }))
}

/// GET /folders/{id}/contents: newest first.
pub async fn list_contents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Content>>> {
    let owner = claims.sub.to_string();
    let contents = state
        .with_db(move |db| {
            let id = id.to_string();
            if db.get_folder(&owner, &id)?.is_none() {
                return Ok(None);
            }
            Ok(Some(db.folder_contents(&owner, &id)?))
        })
        .await?
        .ok_or(ApiError::NotFound("folder"))?;
    Ok(Json(contents))
}

/// POST /folders/{id}/contents?name=: the raw request body becomes a new content.
pub async fn upload_content(
    State(state): State<AppState>,
    Path(folder_id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<impl IntoResponse> {
    let name = query.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let owner = claims.sub.to_string();
    let lookup_owner = owner.clone();
    let folder = state
        .with_db(move |db| db.get_folder(&lookup_owner, &folder_id.to_string()))
        .await?;
    if folder.is_none() {
        return Err(ApiError::NotFound("folder"));
    }

    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let kind = media::classify(content_type, &name);

    let limit = state.settings.max_upload_bytes;
    let stored = state
        .storage
        .put(CONTENT_PREFIX, &name, body.into_data_stream(), limit)
        .await?;

    let id = Uuid::new_v4();
    let row = stored.clone();
    let inserted = state
        .with_db(move |db| {
            db.insert_content(NewContent {
                id: &id.to_string(),
                owner_id: &owner,
                folder_id: &folder_id.to_string(),
                name: &name,
                kind,
                storage_path: &row.path,
                url: &row.url,
                size_bytes: row.size,
                sha256: &row.sha256,
            })
        })
        .await;

    let content = match inserted {
        Ok(content) => content,
        Err(e) => {
            state.storage.delete_all(&[stored.path]).await;
            return Err(e);
        }
    };

    info!(
        "{} ({}) uploaded {} ({}, {})",
        claims.username,
        claims.sub,
        content.name,
        content.kind.as_str(),
        media::format_bytes(content.size_bytes)
    );
    state
        .dispatcher
        .notify_change(claims.sub, Table::Contents, ChangeAction::Insert, content.id);

    Ok((StatusCode::CREATED, Json(content)))
}

/// DELETE /contents/{id}: the row goes first; storage cleanup is best effort.
pub async fn delete_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let owner = claims.sub.to_string();
    let removed = state
        .with_db(move |db| db.delete_content(&owner, &id.to_string()))
        .await?
        .ok_or(ApiError::NotFound("content"))?;

    state
        .dispatcher
        .notify_change(claims.sub, Table::Contents, ChangeAction::Delete, id);
    media_removed(&state, claims.sub, removed).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn media_removed(state: &AppState, owner: Uuid, removed: RemovedMedia) {
    if !removed.storage_paths.is_empty() {
        state.storage.delete_all(&removed.storage_paths).await;
    }
    for playlist_id in removed.playlists {
        if let Err(e) = items_changed(state, owner, playlist_id, ChangeAction::Delete, playlist_id).await {
            warn!("Failed to announce changes to playlist {}: {}", playlist_id, e);
        }
    }
}
