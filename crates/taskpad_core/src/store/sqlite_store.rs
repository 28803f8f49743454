//! SQLite-backed slot store.
//!
//! # Invariants
//! - One row per slot in `kv_slots`; `set` is an upsert.
//! - The connection must come from `db::open_db*` so the table exists.

use super::{validate_key, KeyValueStore, StoreResult};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

/// Slot store over a borrowed, already-migrated connection.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl KeyValueStore for SqliteStore<'_> {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        validate_key(key)?;
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_slots WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.conn.execute(
            "INSERT INTO kv_slots (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![key, value],
        )?;
        debug!(
            "event=slot_write module=store status=ok key={key} bytes={}",
            value.len()
        );
        Ok(())
    }
}
