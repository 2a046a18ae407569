//! SQLite-backed owner account store.
//!
//! Account traffic is a handful of queries per session, so one shared
//! connection is enough here, no read pool.

use super::auth::TokenValue;
use super::schema::OWNER_VERSIONED_SCHEMAS;
use crate::library_store::StoreError;
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: i64,
    pub username: String,
}

pub trait OwnerStore: Send + Sync {
    /// Create an account. Conflict when the username is taken.
    fn create_owner(&self, username: &str, password_hash: &str) -> Result<i64, StoreError>;

    fn get_owner_by_username(&self, username: &str) -> Result<Option<Owner>, StoreError>;

    fn get_password_hash(&self, owner_id: i64) -> Result<Option<String>, StoreError>;

    fn add_token(&self, owner_id: i64, token: &TokenValue) -> Result<(), StoreError>;

    /// The owner a live session token belongs to.
    fn get_owner_by_token(&self, token: &TokenValue) -> Result<Option<Owner>, StoreError>;

    /// Invalidate one session token. Returns whether it existed.
    fn remove_token(&self, token: &TokenValue) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct SqliteOwnerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOwnerStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref()).context("Failed to open owner database")?;
        migrate_if_needed(&mut conn, OWNER_VERSIONED_SCHEMAS)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(SqliteOwnerStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl OwnerStore for SqliteOwnerStore {
    fn create_owner(&self, username: &str, password_hash: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO owners (username, password_hash) VALUES (?1, ?2)",
            params![username, password_hash],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_owner_by_username(&self, username: &str) -> Result<Option<Owner>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let owner = conn
            .query_row(
                "SELECT id, username FROM owners WHERE username = ?1",
                params![username],
                |row| {
                    Ok(Owner {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(owner)
    }

    fn get_password_hash(&self, owner_id: i64) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let hash = conn
            .query_row(
                "SELECT password_hash FROM owners WHERE id = ?1",
                params![owner_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    fn add_token(&self, owner_id: i64, token: &TokenValue) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tokens (owner_id, value) VALUES (?1, ?2)",
            params![owner_id, token.0],
        )?;
        Ok(())
    }

    fn get_owner_by_token(&self, token: &TokenValue) -> Result<Option<Owner>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let owner = conn
            .query_row(
                "SELECT o.id, o.username FROM owners o \
                 JOIN tokens t ON t.owner_id = o.id WHERE t.value = ?1",
                params![token.0],
                |row| {
                    Ok(Owner {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(owner)
    }

    fn remove_token(&self, token: &TokenValue) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM tokens WHERE value = ?1", params![token.0])?;
        Ok(removed > 0)
    }
}
