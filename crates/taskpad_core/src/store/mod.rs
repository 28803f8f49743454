//! Key-value slot store abstraction and implementations.
//!
//! # Responsibility
//! - Define the `get`/`set` contract the task list persists through.
//! - Keep SQLite details behind that contract.
//!
//! # Invariants
//! - `set` replaces the whole slot value; there are no partial writes.
//! - Keys are non-empty.

use crate::db::DbError;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite_store;

pub use sqlite_store::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    InvalidKey(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidKey(key) => write!(f, "invalid slot key `{key}`"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidKey(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable local key-value store holding named string slots.
pub trait KeyValueStore {
    /// Reads a slot; `Ok(None)` when the slot was never written.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    /// Replaces a slot value.
    fn set(&mut self, key: &str, value: &str) -> StoreResult<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &mut S {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        (**self).set(key, value)
    }
}

/// Process-local store. Contents are lost on drop.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: HashMap<String, String>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with one slot already populated.
    pub fn with_slot(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut slots = HashMap::new();
        slots.insert(key.into(), value.into());
        Self { slots, writes: 0 }
    }

    /// Number of successful `set` calls since construction.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        validate_key(key)?;
        Ok(self.slots.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.slots.insert(key.to_string(), value.to_string());
        self.writes += 1;
        Ok(())
    }
}

pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    if key.trim().is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{KeyValueStore, MemoryStore, StoreError};

    #[test]
    fn memory_store_replaces_slot_and_counts_writes() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("slot").unwrap(), None);

        store.set("slot", "one").unwrap();
        store.set("slot", "two").unwrap();

        assert_eq!(store.get("slot").unwrap().as_deref(), Some("two"));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn memory_store_rejects_blank_key() {
        let mut store = MemoryStore::new();
        let err = store.set("  ", "value").unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
        assert_eq!(store.write_count(), 0);
    }
}
