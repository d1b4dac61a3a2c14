use anyhow::{Result, bail};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use signage_types::models::{Display, DisplayStatus};

use super::{OptionalExt, is_constraint_violation};
use crate::Database;
use crate::models::{DeviceAuthRow, now_timestamp, opt_ts_col, opt_uuid_col, ts_col, uuid_col};

const DISPLAY_COLUMNS: &str = "d.id, d.name, d.status, d.pairing_code, d.user_id, d.playlist_id, d.last_seen_at, d.created_at";

/// Attempts at finding an unused pairing code before giving up.
const MAX_CODE_ATTEMPTS: usize = 16;

fn display_from_row(row: &Row<'_>) -> rusqlite::Result<Display> {
    Ok(Display {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        status: DisplayStatus::parse(&row.get::<_, String>(2)?),
        pairing_code: row.get(3)?,
        user_id: opt_uuid_col(row, 4)?,
        playlist_id: opt_uuid_col(row, 5)?,
        last_seen_at: opt_ts_col(row, 6)?,
        created_at: ts_col(row, 7)?,
    })
}

fn query_display(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<Display>> {
    let sql = format!(
        "SELECT {} FROM displays d WHERE d.id = ?1 AND d.user_id = ?2",
        DISPLAY_COLUMNS
    );
    conn.query_row(&sql, [id, owner_id], display_from_row).optional()
}

impl Database {
    // -- Provisioning & pairing --

    /// Create an unclaimed display. Pairing codes are drawn from `next_code`
    /// until one is free; returns the code that was stored.
    pub fn provision_display<F>(&self, id: &str, name: &str, key_hash: &str, mut next_code: F) -> Result<String>
    where
        F: FnMut() -> String,
    {
        self.with_conn(|conn| {
            for _ in 0..MAX_CODE_ATTEMPTS {
                let code = next_code();
                match conn.execute(
                    "INSERT INTO displays (id, name, pairing_code, device_key_hash) VALUES (?1, ?2, ?3, ?4)",
                    (id, name, &code, key_hash),
                ) {
                    Ok(_) => return Ok(code),
                    Err(e) if is_constraint_violation(&e) => {
                        // Either the code or the id is taken; only a code clash is worth retrying.
                        let id_taken: bool = conn.query_row(
                            "SELECT EXISTS(SELECT 1 FROM displays WHERE id = ?1)",
                            [id],
                            |r| r.get(0),
                        )?;
                        if id_taken {
                            return Err(e.into());
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            bail!("no free pairing code after {} attempts", MAX_CODE_ATTEMPTS)
        })
    }

    /// Associate the display holding `code` with `user_id`.
    /// Returns `None` when no unclaimed display has that code.
    pub fn claim_display(&self, code: &str, user_id: &str) -> Result<Option<Display>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE displays SET user_id = ?1 WHERE pairing_code = ?2 AND user_id IS NULL",
                [user_id, code],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let sql = format!(
                "SELECT {} FROM displays d WHERE d.pairing_code = ?1",
                DISPLAY_COLUMNS
            );
            conn.query_row(&sql, [code], display_from_row).optional()
        })
    }

    // -- Owner views --

    /// Owned displays by name, each with its assigned playlist's name.
    pub fn list_displays(&self, owner_id: &str) -> Result<Vec<(Display, Option<String>)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, p.name
                 FROM displays d
                 LEFT JOIN playlists p ON p.id = d.playlist_id
                 WHERE d.user_id = ?1
                 ORDER BY d.name COLLATE NOCASE, d.rowid",
                DISPLAY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id], |row| Ok((display_from_row(row)?, row.get(8)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_display(&self, owner_id: &str, id: &str) -> Result<Option<Display>> {
        self.with_conn(|conn| query_display(conn, owner_id, id))
    }

    /// `playlist_id`: `None` keeps the assignment, `Some(None)` clears it.
    pub fn update_display(
        &self,
        owner_id: &str,
        id: &str,
        name: Option<&str>,
        playlist_id: Option<Option<&str>>,
    ) -> Result<Option<Display>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some(name) = name {
                tx.execute(
                    "UPDATE displays SET name = ?1 WHERE id = ?2 AND user_id = ?3",
                    (name, id, owner_id),
                )?;
            }
            if let Some(playlist_id) = playlist_id {
                tx.execute(
                    "UPDATE displays SET playlist_id = ?1 WHERE id = ?2 AND user_id = ?3",
                    (playlist_id, id, owner_id),
                )?;
            }
            let display = query_display(&tx, owner_id, id)?;
            tx.commit()?;
            Ok(display)
        })
    }

    pub fn delete_display(&self, owner_id: &str, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM displays WHERE id = ?1 AND user_id = ?2",
                [id, owner_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Displays currently assigned to a playlist.
    pub fn displays_with_playlist(&self, playlist_id: &str) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM displays WHERE playlist_id = ?1")?;
            let ids = stmt
                .query_map([playlist_id], |row| uuid_col(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Device side --

    pub fn get_device_auth(&self, display_id: &str) -> Result<Option<DeviceAuthRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, device_key_hash, user_id, playlist_id FROM displays WHERE id = ?1",
                [display_id],
                |row| {
                    Ok(DeviceAuthRow {
                        id: uuid_col(row, 0)?,
                        device_key_hash: row.get(1)?,
                        user_id: opt_uuid_col(row, 2)?,
                        playlist_id: opt_uuid_col(row, 3)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn record_heartbeat(&self, display_id: &str, status: DisplayStatus) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE displays SET status = ?1, last_seen_at = ?2 WHERE id = ?3",
                (status.as_str(), now_timestamp(), display_id),
            )?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("00000000-0000-0000-0000-0000000000a1", "alice", "x").unwrap();
        db.create_user("00000000-0000-0000-0000-0000000000b2", "bob", "x").unwrap();
        db
    }

    const ALICE: &str = "00000000-0000-0000-0000-0000000000a1";
    const BOB: &str = "00000000-0000-0000-0000-0000000000b2";

    fn provision(db: &Database, code: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let code = code.to_string();
        db.provision_display(&id, "Lobby", "hash", move || code.clone()).unwrap();
        id
    }

    #[test]
    fn claim_succeeds_once() {
        let db = setup();
        let id = provision(&db, "AB12");

        let claimed = db.claim_display("AB12", ALICE).unwrap().unwrap();
        assert_eq!(claimed.id.to_string(), id);
        assert_eq!(claimed.user_id.unwrap().to_string(), ALICE);

        // Retrying, by anyone, always fails.
        assert!(db.claim_display("AB12", ALICE).unwrap().is_none());
        assert!(db.claim_display("AB12", BOB).unwrap().is_none());
        assert!(db.claim_display("ZZ99", BOB).unwrap().is_none());
    }

    #[test]
    fn provisioning_retries_taken_codes() {
        let db = setup();
        provision(&db, "AAAA");

        let mut codes = vec!["BBBB".to_string(), "AAAA".to_string()];
        let code = db
            .provision_display(&Uuid::new_v4().to_string(), "Bar", "hash", || codes.pop().unwrap())
            .unwrap();
        assert_eq!(code, "BBBB");
    }

    #[test]
    fn provisioning_gives_up_when_codes_run_out() {
        let db = setup();
        provision(&db, "AAAA");
        let result = db.provision_display(&Uuid::new_v4().to_string(), "Bar", "hash", || "AAAA".into());
        assert!(result.is_err());
    }

    #[test]
    fn displays_are_scoped_to_owner() {
        let db = setup();
        let id = provision(&db, "CD34");
        db.claim_display("CD34", ALICE).unwrap();

        assert_eq!(db.list_displays(ALICE).unwrap().len(), 1);
        assert!(db.list_displays(BOB).unwrap().is_empty());
        assert!(db.get_display(BOB, &id).unwrap().is_none());
        assert!(!db.delete_display(BOB, &id).unwrap());
        assert!(db.delete_display(ALICE, &id).unwrap());
        assert!(db.get_display(ALICE, &id).unwrap().is_none());
    }

    #[test]
    fn heartbeat_updates_status_and_last_seen() {
        let db = setup();
        let id = provision(&db, "EF56");
        db.claim_display("EF56", ALICE).unwrap();

        assert!(db.record_heartbeat(&id, DisplayStatus::On).unwrap());
        let display = db.get_display(ALICE, &id).unwrap().unwrap();
        assert_eq!(display.status, DisplayStatus::On);
        assert!(display.last_seen_at.is_some());

        assert!(!db.record_heartbeat(&Uuid::new_v4().to_string(), DisplayStatus::On).unwrap());
    }

    #[test]
    fn rename_and_clear_playlist() {
        let db = setup();
        let id = provision(&db, "GH78");
        db.claim_display("GH78", ALICE).unwrap();
        let playlist = Uuid::new_v4().to_string();
        db.create_playlist(&playlist, ALICE, "Morning", None).unwrap();

        let updated = db
            .update_display(ALICE, &id, Some("Entrance"), Some(Some(&playlist)))
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Entrance");
        assert_eq!(updated.playlist_id.unwrap().to_string(), playlist);
        assert_eq!(db.displays_with_playlist(&playlist).unwrap().len(), 1);

        let (_, playlist_name) = db.list_displays(ALICE).unwrap().remove(0);
        assert_eq!(playlist_name.as_deref(), Some("Morning"));

        let cleared = db.update_display(ALICE, &id, None, Some(None)).unwrap().unwrap();
        assert_eq!(cleared.name, "Entrance");
        assert!(cleared.playlist_id.is_none());
    }
}
