use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE playlists (
                id          TEXT PRIMARY KEY,
                owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                description TEXT,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE displays (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'unknown',
                pairing_code    TEXT NOT NULL UNIQUE,
                device_key_hash TEXT NOT NULL,
                user_id         TEXT REFERENCES users(id) ON DELETE SET NULL,
                playlist_id     TEXT REFERENCES playlists(id) ON DELETE SET NULL,
                last_seen_at    TEXT,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_displays_user ON displays(user_id);

            CREATE TABLE content_folders (
                id          TEXT PRIMARY KEY,
                owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                parent_id   TEXT REFERENCES content_folders(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_folders_parent ON content_folders(owner_id, parent_id);

            CREATE TABLE contents (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                folder_id       TEXT NOT NULL REFERENCES content_folders(id) ON DELETE CASCADE,
                name            TEXT NOT NULL,
                kind            TEXT NOT NULL,
                storage_path    TEXT NOT NULL,
                url             TEXT NOT NULL,
                size_bytes      INTEGER NOT NULL,
                sha256          TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_contents_folder ON contents(folder_id, created_at);

            CREATE TABLE playlist_items (
                id                  TEXT PRIMARY KEY,
                playlist_id         TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
                content_id          TEXT NOT NULL REFERENCES contents(id) ON DELETE CASCADE,
                position            INTEGER NOT NULL,
                duration_seconds    INTEGER NOT NULL,
                created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_items_playlist ON playlist_items(playlist_id, position);

            CREATE TABLE display_logs (
                id          TEXT PRIMARY KEY,
                display_id  TEXT NOT NULL REFERENCES displays(id) ON DELETE CASCADE,
                kind        TEXT NOT NULL,
                message     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_logs_display ON display_logs(display_id, created_at);

            CREATE TABLE display_screenshots (
                id              TEXT PRIMARY KEY,
                display_id      TEXT NOT NULL REFERENCES displays(id) ON DELETE CASCADE,
                storage_path    TEXT NOT NULL,
                url             TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_screenshots_display ON display_screenshots(display_id, created_at);

            CREATE TABLE commands (
                id              TEXT PRIMARY KEY,
                display_id      TEXT NOT NULL REFERENCES displays(id) ON DELETE CASCADE,
                kind            TEXT NOT NULL,
                payload         TEXT NOT NULL DEFAULT 'null',
                status          TEXT NOT NULL DEFAULT 'pending',
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                delivered_at    TEXT
            );

            CREATE INDEX idx_commands_pending ON commands(display_id, status);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
