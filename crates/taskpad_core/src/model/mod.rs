//! Domain model for the task list.
//!
//! # Responsibility
//! - Define the data structures used by the task list service.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`, not by its position.
//! - Deletion removes tasks outright; there are no tombstones.

pub mod task;
