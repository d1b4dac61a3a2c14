use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use signage_types::models::{Content, ContentFolder};

use super::{CONTENT_COLUMNS, OptionalExt, content_from_row, renumber_playlist};
use crate::Database;
use crate::models::{NewContent, RemovedMedia, opt_uuid_col, ts_col, uuid_col};

/// Guards against cycles in hand-edited data while walking up the tree.
const MAX_FOLDER_DEPTH: usize = 64;

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<ContentFolder> {
    Ok(ContentFolder {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        parent_id: opt_uuid_col(row, 2)?,
        created_at: ts_col(row, 3)?,
    })
}

fn query_folder(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<ContentFolder>> {
    conn.query_row(
        "SELECT id, name, parent_id, created_at FROM content_folders WHERE id = ?1 AND owner_id = ?2",
        [id, owner_id],
        folder_from_row,
    )
    .optional()
}

fn query_content(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<Content>> {
    let sql = format!(
        "SELECT {} FROM contents c WHERE c.id = ?1 AND c.owner_id = ?2",
        CONTENT_COLUMNS
    );
    conn.query_row(&sql, [id, owner_id], |row| content_from_row(row, 0))
        .optional()
}

/// Playlists holding items that point at contents matching `filter`.
fn playlists_referencing(conn: &Connection, filter: &str, param: &str) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT i.playlist_id FROM playlist_items i JOIN contents c ON c.id = i.content_id WHERE {}",
        filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([param], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn parse_ids(ids: &[String]) -> Vec<Uuid> {
    ids.iter().filter_map(|id| id.parse().ok()).collect()
}

const SUBTREE: &str = "WITH RECURSIVE subtree(id) AS (
        SELECT id FROM content_folders WHERE id = ?1
        UNION ALL
        SELECT f.id FROM content_folders f JOIN subtree s ON f.parent_id = s.id
    )";

impl Database {
    // -- Folders --

    /// All owned folders by name.
    pub fn list_folders(&self, owner_id: &str) -> Result<Vec<ContentFolder>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, parent_id, created_at FROM content_folders
                 WHERE owner_id = ?1
                 ORDER BY name COLLATE NOCASE, rowid",
            )?;
            let rows = stmt
                .query_map([owner_id], folder_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Direct subfolders of `parent_id`, or root folders when `None`.
    pub fn child_folders(&self, owner_id: &str, parent_id: Option<&str>) -> Result<Vec<ContentFolder>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, parent_id, created_at FROM content_folders
                 WHERE owner_id = ?1 AND parent_id IS ?2
                 ORDER BY name COLLATE NOCASE, rowid",
            )?;
            let rows = stmt
                .query_map((owner_id, parent_id), folder_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn create_folder(
        &self,
        id: &str,
        owner_id: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<ContentFolder> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO content_folders (id, owner_id, name, parent_id) VALUES (?1, ?2, ?3, ?4)",
                (id, owner_id, name, parent_id),
            )?;
            query_folder(conn, owner_id, id)?
                .ok_or_else(|| anyhow::anyhow!("folder {} vanished after insert", id))
        })
    }

    pub fn get_folder(&self, owner_id: &str, id: &str) -> Result<Option<ContentFolder>> {
        self.with_conn(|conn| query_folder(conn, owner_id, id))
    }

    /// The folder and its ancestors, root first. Empty if the folder is unknown.
    pub fn folder_path(&self, owner_id: &str, id: &str) -> Result<Vec<ContentFolder>> {
        self.with_conn(|conn| {
            let mut chain = Vec::new();
            let mut next = Some(id.to_string());
            while let Some(current) = next {
                if chain.len() >= MAX_FOLDER_DEPTH {
                    anyhow::bail!("folder {} nests deeper than {}", id, MAX_FOLDER_DEPTH);
                }
                let Some(folder) = query_folder(conn, owner_id, &current)? else {
                    break;
                };
                next = folder.parent_id.map(|p| p.to_string());
                chain.push(folder);
            }
            chain.reverse();
            Ok(chain)
        })
    }

    /// Delete a folder with its subtree and contents. Items pointing at the
    /// removed contents go too and the affected playlists are renumbered.
    pub fn delete_folder(&self, owner_id: &str, id: &str) -> Result<Option<RemovedMedia>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_folder(&tx, owner_id, id)?.is_none() {
                return Ok(None);
            }

            let storage_paths = {
                let sql = format!(
                    "{} SELECT storage_path FROM contents WHERE folder_id IN (SELECT id FROM subtree)",
                    SUBTREE
                );
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt
                    .query_map([id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };
            let playlists = {
                let sql = format!(
                    "{} SELECT DISTINCT i.playlist_id FROM playlist_items i
                       JOIN contents c ON c.id = i.content_id
                       WHERE c.folder_id IN (SELECT id FROM subtree)",
                    SUBTREE
                );
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt
                    .query_map([id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };

            tx.execute("DELETE FROM content_folders WHERE id = ?1", [id])?;
            for playlist in &playlists {
                renumber_playlist(&tx, playlist)?;
            }
            tx.commit()?;

            Ok(Some(RemovedMedia {
                storage_paths,
                playlists: parse_ids(&playlists),
            }))
        })
    }

    // -- Contents --

    /// Direct-child contents of a folder, newest first.
    pub fn folder_contents(&self, owner_id: &str, folder_id: &str) -> Result<Vec<Content>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM contents c
                 WHERE c.folder_id = ?1 AND c.owner_id = ?2
                 ORDER BY c.created_at DESC, c.rowid DESC",
                CONTENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([folder_id, owner_id], |row| content_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn insert_content(&self, new: NewContent<'_>) -> Result<Content> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO contents (id, owner_id, folder_id, name, kind, storage_path, url, size_bytes, sha256)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    new.id,
                    new.owner_id,
                    new.folder_id,
                    new.name,
                    new.kind.as_str(),
                    new.storage_path,
                    new.url,
                    new.size_bytes as i64,
                    new.sha256,
                ],
            )?;
            query_content(conn, new.owner_id, new.id)?
                .ok_or_else(|| anyhow::anyhow!("content {} vanished after insert", new.id))
        })
    }

    pub fn get_content(&self, owner_id: &str, id: &str) -> Result<Option<Content>> {
        self.with_conn(|conn| query_content(conn, owner_id, id))
    }

    /// Delete a content row; playlist items using it are removed and renumbered.
    pub fn delete_content(&self, owner_id: &str, id: &str) -> Result<Option<RemovedMedia>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let storage_path: Option<String> = tx
                .query_row(
                    "SELECT storage_path FROM contents WHERE id = ?1 AND owner_id = ?2",
                    [id, owner_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(storage_path) = storage_path else {
                return Ok(None);
            };

            let playlists = playlists_referencing(&tx, "c.id = ?1", id)?;
            tx.execute("DELETE FROM contents WHERE id = ?1", [id])?;
            for playlist in &playlists {
                renumber_playlist(&tx, playlist)?;
            }
            tx.commit()?;

            Ok(Some(RemovedMedia {
                storage_paths: vec![storage_path],
                playlists: parse_ids(&playlists),
            }))
        })
    }
}
