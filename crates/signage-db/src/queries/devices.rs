use anyhow::{Result, anyhow};
use chrono::{SecondsFormat, TimeDelta, Utc};
use rusqlite::{Connection, Row};

use signage_types::models::{Command, CommandKind, CommandStatus, DisplayLog, LogKind, Screenshot};

use super::OptionalExt;
use crate::Database;
use crate::models::{ExpiredScreenshot, now_timestamp, ts_col, uuid_col};

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<DisplayLog> {
    Ok(DisplayLog {
        id: uuid_col(row, 0)?,
        display_id: uuid_col(row, 1)?,
        kind: LogKind::parse(&row.get::<_, String>(2)?),
        message: row.get(3)?,
        created_at: ts_col(row, 4)?,
    })
}

fn screenshot_from_row(row: &Row<'_>) -> rusqlite::Result<Screenshot> {
    Ok(Screenshot {
        id: uuid_col(row, 0)?,
        display_id: uuid_col(row, 1)?,
        url: row.get(2)?,
        created_at: ts_col(row, 3)?,
    })
}

fn command_from_row(row: &Row<'_>) -> rusqlite::Result<Command> {
    let kind: String = row.get(2)?;
    let payload: String = row.get(3)?;
    Ok(Command {
        id: uuid_col(row, 0)?,
        display_id: uuid_col(row, 1)?,
        kind: CommandKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown command kind '{}'", kind).into(),
            )
        })?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into()))?,
        status: CommandStatus::parse(&row.get::<_, String>(4)?),
        created_at: ts_col(row, 5)?,
    })
}

const COMMAND_COLUMNS: &str = "id, display_id, kind, payload, status, created_at";

fn query_command(conn: &Connection, id: &str) -> Result<Option<Command>> {
    let sql = format!("SELECT {} FROM commands WHERE id = ?1", COMMAND_COLUMNS);
    conn.query_row(&sql, [id], command_from_row).optional()
}

impl Database {
    // -- Logs --

    pub fn insert_log(&self, id: &str, display_id: &str, kind: LogKind, message: &str) -> Result<DisplayLog> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO display_logs (id, display_id, kind, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, display_id, kind.as_str(), message, now_timestamp()),
            )?;
            conn.query_row(
                "SELECT id, display_id, kind, message, created_at FROM display_logs WHERE id = ?1",
                [id],
                log_from_row,
            )
            .optional()?
            .ok_or_else(|| anyhow!("log {} vanished after insert", id))
        })
    }

    /// Most recent log entries first.
    pub fn recent_logs(&self, display_id: &str, limit: usize) -> Result<Vec<DisplayLog>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, display_id, kind, message, created_at FROM display_logs
                 WHERE display_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![display_id, limit as i64], log_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Screenshots --

    pub fn insert_screenshot(&self, id: &str, display_id: &str, storage_path: &str, url: &str) -> Result<Screenshot> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO display_screenshots (id, display_id, storage_path, url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, display_id, storage_path, url, now_timestamp()),
            )?;
            conn.query_row(
                "SELECT id, display_id, url, created_at FROM display_screenshots WHERE id = ?1",
                [id],
                screenshot_from_row,
            )
            .optional()?
            .ok_or_else(|| anyhow!("screenshot {} vanished after insert", id))
        })
    }

    pub fn recent_screenshots(&self, display_id: &str, limit: usize) -> Result<Vec<Screenshot>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, display_id, url, created_at FROM display_screenshots
                 WHERE display_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![display_id, limit as i64], screenshot_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Screenshots older than `retention_hours`.
    pub fn expired_screenshots(&self, retention_hours: u64) -> Result<Vec<ExpiredScreenshot>> {
        let cutoff = i64::try_from(retention_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| anyhow!("retention of {} hours is out of range", retention_hours))?
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, storage_path FROM display_screenshots WHERE created_at < ?1",
            )?;
            let rows = stmt
                .query_map([&cutoff], |row| {
                    Ok(ExpiredScreenshot {
                        id: row.get(0)?,
                        storage_path: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_screenshot(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM display_screenshots WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Commands --

    pub fn insert_command(
        &self,
        id: &str,
        display_id: &str,
        kind: CommandKind,
        payload: &serde_json::Value,
    ) -> Result<Command> {
        let payload = serde_json::to_string(payload)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO commands (id, display_id, kind, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, display_id, kind.as_str(), &payload, now_timestamp()),
            )?;
            query_command(conn, id)?.ok_or_else(|| anyhow!("command {} vanished after insert", id))
        })
    }

    /// Pending commands in issue order, marked delivered in the same transaction.
    pub fn take_pending_commands(&self, display_id: &str) -> Result<Vec<Command>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut commands = {
                let sql = format!(
                    "SELECT {} FROM commands
                     WHERE display_id = ?1 AND status = 'pending'
                     ORDER BY created_at, rowid",
                    COMMAND_COLUMNS
                );
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt
                    .query_map([display_id], command_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };

            let delivered_at = now_timestamp();
            for command in &mut commands {
                tx.execute(
                    "UPDATE commands SET status = 'delivered', delivered_at = ?1 WHERE id = ?2",
                    (&delivered_at, command.id.to_string()),
                )?;
                command.status = CommandStatus::Delivered;
            }
            tx.commit()?;
            Ok(commands)
        })
    }

    /// Mark a single pushed command delivered.
    pub fn mark_command_delivered(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE commands SET status = 'delivered', delivered_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                (now_timestamp(), id),
            )?;
            Ok(changed > 0)
        })
    }

    /// `false` when the command does not belong to the display.
    pub fn ack_command(&self, display_id: &str, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE commands
                 SET status = 'acknowledged', delivered_at = COALESCE(delivered_at, ?1)
                 WHERE id = ?2 AND display_id = ?3",
                (now_timestamp(), id, display_id),
            )?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4().to_string();
        db.provision_display(&id, "Lobby", "hash", || "AB12".into()).unwrap();
        (db, id)
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    #[test]
    fn logs_come_back_newest_first_and_limited() {
        let (db, display) = setup();
        for i in 0..5 {
            db.insert_log(&new_id(), &display, LogKind::Info, &format!("line {}", i)).unwrap();
        }
        db.insert_log(&new_id(), &display, LogKind::Error, "boom").unwrap();

        let logs = db.recent_logs(&display, 3).unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "boom");
        assert_eq!(logs[0].kind, LogKind::Error);
        assert_eq!(logs[1].message, "line 4");
    }

    #[test]
    fn pending_commands_are_delivered_once() {
        let (db, display) = setup();
        let first = db
            .insert_command(&new_id(), &display, CommandKind::Refresh, &serde_json::Value::Null)
            .unwrap();
        db.insert_command(&new_id(), &display, CommandKind::Run, &json!({"url": "https://example.org"}))
            .unwrap();
        assert_eq!(first.status, CommandStatus::Pending);

        let taken = db.take_pending_commands(&display).unwrap();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].kind, CommandKind::Refresh);
        assert_eq!(taken[1].payload["url"], "https://example.org");
        assert!(taken.iter().all(|c| c.status == CommandStatus::Delivered));

        assert!(db.take_pending_commands(&display).unwrap().is_empty());
    }

    #[test]
    fn ack_is_scoped_to_display() {
        let (db, display) = setup();
        let command = db
            .insert_command(&new_id(), &display, CommandKind::Reboot, &serde_json::Value::Null)
            .unwrap();
        let id = command.id.to_string();

        assert!(!db.ack_command(&new_id(), &id).unwrap());
        assert!(db.ack_command(&display, &id).unwrap());
        assert!(!db.mark_command_delivered(&id).unwrap());
        assert!(db.take_pending_commands(&display).unwrap().is_empty());
    }

    #[test]
    fn old_screenshots_expire() {
        let (db, display) = setup();
        let old = new_id();
        db.insert_screenshot(&old, &display, "old.png", "http://localhost/media/old.png").unwrap();
        db.insert_screenshot(&new_id(), &display, "new.png", "http://localhost/media/new.png").unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE display_screenshots SET created_at = '2020-01-01T00:00:00.000Z' WHERE id = ?1",
                [&old],
            )?;
            Ok(())
        })
        .unwrap();

        let expired = db.expired_screenshots(24).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].storage_path, "old.png");

        assert!(db.delete_screenshot(&expired[0].id).unwrap());
        let remaining = db.recent_screenshots(&display, 5).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].url, "http://localhost/media/new.png");
    }

    #[test]
    fn huge_retention_is_an_error_not_a_panic() {
        let (db, _display) = setup();
        assert!(db.expired_screenshots(3_000_000_000).is_err());
        assert!(db.expired_screenshots(u64::MAX).is_err());
        assert!(db.expired_screenshots(0).unwrap().is_empty());
    }
}
