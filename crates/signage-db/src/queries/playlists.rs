use anyhow::Result;
use rusqlite::{Connection, Row};

use signage_core::ordering;
use signage_types::models::{Playlist, PlaylistItem};

use super::{OptionalExt, query_items, query_positions, write_positions};
use crate::Database;
use crate::models::{ts_col, uuid_col};

fn playlist_from_row(row: &Row<'_>) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: ts_col(row, 3)?,
    })
}

fn query_playlist(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<Playlist>> {
    conn.query_row(
        "SELECT id, name, description, created_at FROM playlists WHERE id = ?1 AND owner_id = ?2",
        [id, owner_id],
        playlist_from_row,
    )
    .optional()
}

impl Database {
    // -- Playlists --

    /// Owned playlists, newest first.
    pub fn list_playlists(&self, owner_id: &str) -> Result<Vec<Playlist>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, created_at FROM playlists
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([owner_id], playlist_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn create_playlist(
        &self,
        id: &str,
        owner_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Playlist> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO playlists (id, owner_id, name, description) VALUES (?1, ?2, ?3, ?4)",
                (id, owner_id, name, description),
            )?;
            query_playlist(conn, owner_id, id)?
                .ok_or_else(|| anyhow::anyhow!("playlist {} vanished after insert", id))
        })
    }

    pub fn get_playlist(&self, owner_id: &str, id: &str) -> Result<Option<Playlist>> {
        self.with_conn(|conn| query_playlist(conn, owner_id, id))
    }

    pub fn update_playlist(
        &self,
        owner_id: &str,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Playlist>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE playlists
                 SET name = COALESCE(?1, name), description = COALESCE(?2, description)
                 WHERE id = ?3 AND owner_id = ?4",
                (name, description, id, owner_id),
            )?;
            query_playlist(conn, owner_id, id)
        })
    }

    /// Deletes the playlist and its items; displays showing it lose their assignment.
    pub fn delete_playlist(&self, owner_id: &str, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM playlists WHERE id = ?1 AND owner_id = ?2",
                [id, owner_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Items --

    /// Items in play order, joined with their content.
    pub fn playlist_items(&self, playlist_id: &str) -> Result<Vec<PlaylistItem>> {
        self.with_conn(|conn| query_items(conn, playlist_id))
    }

    /// Append an item at the next free position.
    pub fn add_item(
        &self,
        playlist_id: &str,
        item_id: &str,
        content_id: &str,
        duration_seconds: u32,
    ) -> Result<Vec<PlaylistItem>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut items = query_positions(&tx, playlist_id)?;
            ordering::renumber(&mut items);
            write_positions(&tx, &items)?;

            tx.execute(
                "INSERT INTO playlist_items (id, playlist_id, content_id, position, duration_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    item_id,
                    playlist_id,
                    content_id,
                    ordering::next_position(items.len()),
                    duration_seconds
                ],
            )?;
            let items = query_items(&tx, playlist_id)?;
            tx.commit()?;
            Ok(items)
        })
    }

    pub fn update_item_duration(&self, playlist_id: &str, item_id: &str, duration_seconds: u32) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE playlist_items SET duration_seconds = ?1 WHERE id = ?2 AND playlist_id = ?3",
                rusqlite::params![duration_seconds, item_id, playlist_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove one item and renumber the rest. `None` if the item is not in the playlist.
    pub fn remove_item(&self, playlist_id: &str, item_id: &str) -> Result<Option<Vec<PlaylistItem>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut items = query_positions(&tx, playlist_id)?;
            let Some(index) = items.iter().position(|i| i.id == item_id) else {
                return Ok(None);
            };

            ordering::remove_item(&mut items, index)?;
            tx.execute("DELETE FROM playlist_items WHERE id = ?1", [item_id])?;
            write_positions(&tx, &items)?;

            let items = query_items(&tx, playlist_id)?;
            tx.commit()?;
            Ok(Some(items))
        })
    }

    /// Move the item at `from` to `to` and persist every position atomically.
    pub fn reorder_items(&self, playlist_id: &str, from: usize, to: usize) -> Result<Vec<PlaylistItem>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut items = query_positions(&tx, playlist_id)?;
            ordering::move_item(&mut items, from, to)?;
            write_positions(&tx, &items)?;

            let items = query_items(&tx, playlist_id)?;
            tx.commit()?;
            Ok(items)
        })
    }
}
