//! Core use-case services.
//!
//! # Responsibility
//! - Turn user events into task list mutations.
//! - Keep front ends decoupled from snapshot and storage details.

pub mod task_list_service;
