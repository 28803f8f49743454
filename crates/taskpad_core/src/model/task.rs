//! Task domain model.
//!
//! # Responsibility
//! - Define the task record owned by the task list.
//! - Define the view filter used to project the list.
//!
//! # Invariants
//! - `text` is never empty or whitespace-only.
//! - `id` is stable for the task lifetime and never reused within one list.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Stable identifier assigned to a task when it is created.
///
/// Ids are positive and monotonically increasing within one task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// First id handed out by an empty list.
    pub const FIRST: TaskId = TaskId(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Returns the id following this one, or `None` once `u64::MAX` is used.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

/// Validation error for task construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskValidationError {
    /// Text is empty after trimming whitespace.
    EmptyText,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText => write!(f, "task text cannot be empty"),
        }
    }
}

impl Error for TaskValidationError {}

/// Single to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: TaskId,
    /// Stored exactly as submitted; only the emptiness check trims.
    pub text: String,
    pub completed: bool,
}

impl Task {
    /// Creates an incomplete task.
    ///
    /// # Errors
    /// - Returns `TaskValidationError::EmptyText` for empty/whitespace text.
    pub fn new(id: TaskId, text: impl Into<String>) -> Result<Self, TaskValidationError> {
        let text = text.into();
        if is_blank(&text) {
            return Err(TaskValidationError::EmptyText);
        }
        Ok(Self {
            id,
            text,
            completed: false,
        })
    }

    /// Whether this task passes the given filter.
    pub fn matches(&self, filter: Filter) -> bool {
        match filter {
            Filter::All => true,
            Filter::Active => !self.completed,
            Filter::Completed => self.completed,
        }
    }
}

/// View selector applied to the task list. Never changes the list itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub const ALL: [Filter; 3] = [Filter::All, Filter::Active, Filter::Completed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a filter name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFilter(pub String);

impl Display for UnknownFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown filter `{}`; expected all|active|completed",
            self.0
        )
    }
}

impl Error for UnknownFilter {}

impl FromStr for Filter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(UnknownFilter(other.to_string())),
        }
    }
}

/// Whether `text` would be rejected as task text.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
