//! Database-only row types and column decoding helpers.
//!
//! Rows that the API serves as-is are decoded straight into
//! `signage_types::models`; the types here never leave the server.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use signage_core::ordering::Positioned;
use signage_types::models::ContentKind;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

/// What a device needs to authenticate and route its events.
pub struct DeviceAuthRow {
    pub id: Uuid,
    pub device_key_hash: String,
    pub user_id: Option<Uuid>,
    pub playlist_id: Option<Uuid>,
}

/// Position bookkeeping for one playlist item.
#[derive(Debug, Clone)]
pub struct ItemPosition {
    pub id: String,
    pub position: i64,
}

impl Positioned for ItemPosition {
    fn position(&self) -> i64 {
        self.position
    }

    fn set_position(&mut self, position: i64) {
        self.position = position;
    }
}

/// Fields of a freshly uploaded content row.
pub struct NewContent<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub folder_id: &'a str,
    pub name: &'a str,
    pub kind: ContentKind,
    pub storage_path: &'a str,
    pub url: &'a str,
    pub size_bytes: u64,
    pub sha256: &'a str,
}

/// Result of deleting content rows: the objects to remove from storage and
/// the playlists whose items were renumbered.
#[derive(Debug)]
pub struct RemovedMedia {
    pub storage_paths: Vec<String>,
    pub playlists: Vec<Uuid>,
}

#[derive(Debug)]
pub struct ExpiredScreenshot {
    pub id: String,
    pub storage_path: String,
}

/// Timestamp format written by the server.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 and SQLite's `YYYY-MM-DD HH:MM:SS`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok().or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|ndt| ndt.and_utc())
    })
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

pub(crate) fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| conversion_error(idx, format!("bad uuid '{}': {}", raw, e)))
}

pub(crate) fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        raw.parse()
            .map_err(|e| conversion_error(idx, format!("bad uuid '{}': {}", raw, e)))
    })
    .transpose()
}

pub(crate) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp '{}'", raw)))
}

pub(crate) fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        parse_timestamp(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp '{}'", raw)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_both_formats() {
        let now = now_timestamp();
        assert!(parse_timestamp(&now).is_some());

        let sqlite = parse_timestamp("2026-03-01 12:30:00").unwrap();
        assert_eq!(sqlite.to_rfc3339(), "2026-03-01T12:30:00+00:00");

        assert!(parse_timestamp("yesterday").is_none());
    }
}
