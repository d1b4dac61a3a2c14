use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::CommandKind;

/// Tables whose changes are announced over the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Displays,
    Playlists,
    PlaylistItems,
    Contents,
    ContentFolders,
    DisplayLogs,
    DisplayScreenshots,
    Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// Events sent over the dashboard WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A row owned by the receiving user changed; clients refetch.
    TableChanged {
        table: Table,
        action: ChangeAction,
        id: Uuid,
    },
}

impl GatewayEvent {
    pub fn changed(table: Table, action: ChangeAction, id: Uuid) -> Self {
        Self::TableChanged { table, action, id }
    }

    /// Returns the table if this event is scoped to one.
    /// Events that return `None` are always delivered.
    pub fn table(&self) -> Option<Table> {
        match self {
            Self::TableChanged { table, .. } => Some(*table),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Only forward changes for these tables. Until the first Subscribe
    /// every table is forwarded.
    Subscribe { tables: Vec<Table> },
}

/// Events pushed to a display over the device gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DeviceEvent {
    Hello { display_id: Uuid },

    Command {
        id: Uuid,
        kind: CommandKind,
        payload: serde_json::Value,
    },

    PlaylistAssigned { playlist_id: Option<Uuid> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_changed_wire_format() {
        let id = Uuid::nil();
        let event = GatewayEvent::changed(Table::PlaylistItems, ChangeAction::Update, id);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TableChanged");
        assert_eq!(json["data"]["table"], "playlist_items");
        assert_eq!(json["data"]["action"], "update");
        assert_eq!(event.table(), Some(Table::PlaylistItems));
    }

    #[test]
    fn subscribe_parses() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"Subscribe","data":{"tables":["displays","contents"]}}"#)
                .unwrap();
        match cmd {
            GatewayCommand::Subscribe { tables } => {
                assert_eq!(tables, vec![Table::Displays, Table::Contents]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
