mod contents;
mod devices;
mod displays;
mod playlists;
mod users;

use anyhow::Result;
use rusqlite::{Connection, Row};

use signage_core::ordering::{self, Positioned};
use signage_types::models::{Content, ContentKind, PlaylistItem};

use crate::models::{ItemPosition, ts_col, uuid_col};

pub(crate) const CONTENT_COLUMNS: &str =
    "c.id, c.folder_id, c.name, c.kind, c.url, c.size_bytes, c.sha256, c.created_at";

/// Decode the eight `CONTENT_COLUMNS` starting at `offset`.
pub(crate) fn content_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Content> {
    Ok(Content {
        id: uuid_col(row, offset)?,
        folder_id: uuid_col(row, offset + 1)?,
        name: row.get(offset + 2)?,
        kind: ContentKind::parse(&row.get::<_, String>(offset + 3)?),
        url: row.get(offset + 4)?,
        size_bytes: row.get::<_, i64>(offset + 5)? as u64,
        sha256: row.get(offset + 6)?,
        created_at: ts_col(row, offset + 7)?,
    })
}

pub(crate) fn query_items(conn: &Connection, playlist_id: &str) -> Result<Vec<PlaylistItem>> {
    let sql = format!(
        "SELECT i.id, i.playlist_id, i.position, i.duration_seconds, {}
         FROM playlist_items i
         JOIN contents c ON c.id = i.content_id
         WHERE i.playlist_id = ?1
         ORDER BY i.position, i.rowid",
        CONTENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([playlist_id], |row| {
            Ok(PlaylistItem {
                id: uuid_col(row, 0)?,
                playlist_id: uuid_col(row, 1)?,
                position: row.get(2)?,
                duration_seconds: row.get::<_, i64>(3)? as u32,
                content: content_from_row(row, 4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn query_positions(conn: &Connection, playlist_id: &str) -> Result<Vec<ItemPosition>> {
    let mut stmt = conn.prepare(
        "SELECT id, position FROM playlist_items WHERE playlist_id = ?1 ORDER BY position, rowid",
    )?;
    let rows = stmt
        .query_map([playlist_id], |row| {
            Ok(ItemPosition {
                id: row.get(0)?,
                position: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Write every item's position. Callers run this inside a transaction.
pub(crate) fn write_positions(conn: &Connection, wanted: &[ItemPosition]) -> Result<usize> {
    let mut stmt = conn.prepare("UPDATE playlist_items SET position = ?1 WHERE id = ?2")?;
    let mut written = 0;
    for item in wanted {
        written += stmt.execute(rusqlite::params![item.position(), item.id])?;
    }
    Ok(written)
}

/// Reload a playlist's items and close any gaps in their positions.
pub(crate) fn renumber_playlist(conn: &Connection, playlist_id: &str) -> Result<()> {
    let mut items = query_positions(conn, playlist_id)?;
    if ordering::is_dense(&items) {
        return Ok(());
    }
    ordering::renumber(&mut items);
    write_positions(conn, &items)?;
    Ok(())
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// True when the error is a UNIQUE/constraint violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
