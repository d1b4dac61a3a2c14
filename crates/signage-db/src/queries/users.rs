use anyhow::Result;
use rusqlite::Connection;

use super::{OptionalExt, is_constraint_violation};
use crate::Database;
use crate::models::UserRow;

impl Database {
    /// Insert a user. Returns false when the username is already taken.
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            ) {
                Ok(_) => Ok(true),
                Err(e) if is_constraint_violation(&e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use crate::Database;

    #[test]
    fn users_are_unique_by_name() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user("u1", "alice", "hash").unwrap());
        assert!(!db.create_user("u2", "alice", "hash").unwrap());
        assert!(db.get_user_by_id("u2").unwrap().is_none());

        let alice = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(alice.id, "u1");
        assert!(db.get_user_by_id("u1").unwrap().is_some());
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }
}
