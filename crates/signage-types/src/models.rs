use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Status reported by the display itself on heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    On,
    Off,
    /// Management mode: the player is up but not showing a playlist.
    Mgmt,
    #[default]
    Unknown,
}

impl DisplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Mgmt => "mgmt",
            Self::Unknown => "unknown",
        }
    }

    /// Unrecognised values map to `Unknown` rather than failing the row.
    pub fn parse(s: &str) -> Self {
        match s {
            "on" => Self::On,
            "off" => Self::Off,
            "mgmt" => Self::Mgmt,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Display {
    pub id: Uuid,
    pub name: String,
    pub status: DisplayStatus,
    pub pairing_code: String,
    pub user_id: Option<Uuid>,
    pub playlist_id: Option<Uuid>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Image,
    Video,
    Document,
    Html,
    Other,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Html => "html",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "image" => Self::Image,
            "video" => Self::Video,
            "document" => Self::Document,
            "html" => Self::Html,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: Uuid,
    pub folder_id: Uuid,
    pub name: String,
    pub kind: ContentKind,
    pub url: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentFolder {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A playlist entry joined with the content it points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: Uuid,
    pub playlist_id: Uuid,
    pub position: i64,
    pub duration_seconds: u32,
    pub content: Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Command,
    Info,
    Warning,
    Error,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "command" => Self::Command,
            "warning" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayLog {
    pub id: Uuid,
    pub display_id: Uuid,
    pub kind: LogKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    pub id: Uuid,
    pub display_id: Uuid,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Remote commands a user can send to a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Refresh,
    ReloadPlaylist,
    Reboot,
    Run,
    Stop,
    UpdatePlaylist,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::ReloadPlaylist => "reload_playlist",
            Self::Reboot => "reboot",
            Self::Run => "run",
            Self::Stop => "stop",
            Self::UpdatePlaylist => "update_playlist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "refresh" => Self::Refresh,
            "reload_playlist" => Self::ReloadPlaylist,
            "reboot" => Self::Reboot,
            "run" => Self::Run,
            "stop" => Self::Stop,
            "update_playlist" => Self::UpdatePlaylist,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Delivered,
    Acknowledged,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Acknowledged => "acknowledged",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "delivered" => Self::Delivered,
            "acknowledged" => Self::Acknowledged,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub display_id: Uuid,
    pub kind: CommandKind,
    pub payload: serde_json::Value,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_status_wire_names() {
        for status in [
            DisplayStatus::On,
            DisplayStatus::Off,
            DisplayStatus::Mgmt,
            DisplayStatus::Unknown,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(DisplayStatus::parse(status.as_str()), status);
        }
        assert_eq!(DisplayStatus::parse("garbage"), DisplayStatus::Unknown);
    }

    #[test]
    fn command_kind_rejects_unknown() {
        assert_eq!(CommandKind::parse("reload_playlist"), Some(CommandKind::ReloadPlaylist));
        assert_eq!(CommandKind::parse("selfdestruct"), None);
    }
}
