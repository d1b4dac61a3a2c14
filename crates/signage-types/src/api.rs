use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    CommandKind, Content, ContentFolder, Display, DisplayLog, DisplayStatus, LogKind, Playlist,
    PlaylistItem, Screenshot,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Displays --

#[derive(Debug, Serialize, Deserialize)]
pub struct DisplaySummary {
    #[serde(flatten)]
    pub display: Display,
    pub playlist_name: Option<String>,
    pub online: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DisplayDetail {
    pub display: Display,
    pub online: bool,
    /// The display holds an open device gateway socket.
    pub connected: bool,
    pub playlist: Option<Playlist>,
    pub logs: Vec<DisplayLog>,
    pub screenshots: Vec<Screenshot>,
}

/// Accepts a bare code or the payload of a pairing QR code.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimDisplayRequest {
    pub code: String,
}

/// `playlist_id: null` clears the assignment; omitting it leaves it untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateDisplayRequest {
    pub name: Option<String>,
    #[serde(default, with = "double_option")]
    pub playlist_id: Option<Option<Uuid>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendCommandRequest {
    pub kind: CommandKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

// -- Playlists --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePlaylistRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePlaylistRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlaylistDetail {
    pub playlist: Playlist,
    pub items: Vec<PlaylistItem>,
    pub total_duration_seconds: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddItemRequest {
    pub content_id: Uuid,
    pub duration_seconds: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateItemRequest {
    pub duration_seconds: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReorderRequest {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub index: usize,
    pub item_count: usize,
    pub progress_seconds: u32,
    pub remaining_seconds: u32,
    pub percent: f64,
    pub item: Option<PlaylistItem>,
}

// -- Contents --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFolderRequest {
    pub name: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crumb {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BrowseResponse {
    pub folder_id: Option<Uuid>,
    pub path: Vec<Crumb>,
    pub folders: Vec<ContentFolder>,
    pub contents: Vec<Content>,
}

// -- Devices --

#[derive(Debug, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub display_id: Uuid,
    pub pairing_code: String,
    /// Returned once; only its digest is stored.
    pub device_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatRequest {
    pub status: DisplayStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub playlist_id: Option<Uuid>,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceLogRequest {
    pub kind: LogKind,
    pub message: String,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(de).map(Some)
    }
}
