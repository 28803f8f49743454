//! Core domain logic for taskpad.
//! This crate is the single source of truth for task list invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod snapshot;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::task::{Filter, Task, TaskId, TaskValidationError, UnknownFilter};
pub use service::task_list_service::{
    CommandOutcome, EditCursor, TaskCommand, TaskListError, TaskListResult, TaskListService,
    ViewCounts,
};
pub use snapshot::DEFAULT_SLOT_KEY;
pub use store::{KeyValueStore, MemoryStore, SqliteStore, StoreError, StoreResult};

/// Minimal health-check API for front-end wiring checks.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
