//! Persistent snapshot codec.
//!
//! # Responsibility
//! - Serialize the full task list into the slot value.
//! - Decode slot values written by this or earlier versions.
//!
//! # Invariants
//! - Encoded output is a JSON array of `{id, text, completed}` records.
//! - Decoded lists hold unique ids and only non-blank text.
//! - `Snapshot::next_id` is greater than every decoded id.

use crate::model::task::{is_blank, Task, TaskId};
use serde::Deserialize;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Slot name the task list is stored under.
pub const DEFAULT_SLOT_KEY: &str = "tareas";

/// Decoded task list plus the id counter to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub next_id: TaskId,
    /// Records dropped because their text was blank.
    pub dropped: usize,
    /// Records that received a fresh id (missing, zero or duplicate).
    pub reassigned: usize,
    /// Stored ids were exhausted and every task was renumbered.
    pub renumbered: bool,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: TaskId::FIRST,
            dropped: 0,
            reassigned: 0,
            renumbered: false,
        }
    }
}

/// Slot value that is not a task list.
#[derive(Debug)]
pub struct SnapshotError(serde_json::Error);

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed task snapshot: {}", self.0)
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

// Older builds wrote `texto`/`completada` and no id.
#[derive(Debug, Deserialize)]
struct SnapshotRecord {
    #[serde(default)]
    id: Option<u64>,
    #[serde(alias = "texto")]
    text: String,
    #[serde(default, alias = "completada")]
    completed: bool,
}

/// Serializes the task list into the slot representation.
pub fn encode(tasks: &[Task]) -> String {
    // Plain string/bool/integer records; serialization is infallible.
    serde_json::to_string(tasks).unwrap_or_else(|_| String::from("[]"))
}

/// Decodes a slot value.
///
/// Stored ids are kept when unique. When the stored ids leave no room for a
/// following id, the whole list is renumbered from `TaskId::FIRST` in order.
///
/// # Errors
/// - `SnapshotError` when the value is not a JSON array of task records.
///   Callers treat this as an empty list.
pub fn decode(raw: &str) -> Result<Snapshot, SnapshotError> {
    let records: Vec<SnapshotRecord> = serde_json::from_str(raw).map_err(SnapshotError)?;

    let total = records.len();
    let records: Vec<SnapshotRecord> = records
        .into_iter()
        .filter(|record| !is_blank(&record.text))
        .collect();

    let mut snapshot = keep_stored_ids(&records).unwrap_or_else(|| renumber(&records));
    snapshot.dropped = total - records.len();
    Ok(snapshot)
}

fn keep_stored_ids(records: &[SnapshotRecord]) -> Option<Snapshot> {
    let max_id = records.iter().filter_map(|r| r.id).max().unwrap_or(0);
    let mut next_id = TaskId::new(max_id).next()?;
    let mut seen = HashSet::with_capacity(records.len());
    let mut snapshot = Snapshot::empty();

    for record in records {
        let id = match record.id {
            Some(value) if value > 0 && seen.insert(value) => TaskId::new(value),
            _ => {
                snapshot.reassigned += 1;
                let id = next_id;
                next_id = next_id.next()?;
                id
            }
        };
        snapshot.tasks.push(record.to_task(id));
    }

    snapshot.next_id = next_id;
    Some(snapshot)
}

fn renumber(records: &[SnapshotRecord]) -> Snapshot {
    let mut snapshot = Snapshot::empty();
    for (record, value) in records.iter().zip(1u64..) {
        snapshot.tasks.push(record.to_task(TaskId::new(value)));
    }
    snapshot.reassigned = records.len();
    snapshot.renumbered = true;
    snapshot.next_id = TaskId::new(records.len() as u64 + 1);
    snapshot
}

impl SnapshotRecord {
    fn to_task(&self, id: TaskId) -> Task {
        Task {
            id,
            text: self.text.clone(),
            completed: self.completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, encode};
    use crate::model::task::{Task, TaskId};

    #[test]
    fn encode_writes_current_field_names() {
        let mut task = Task::new(TaskId::new(3), "water plants").unwrap();
        task.completed = true;

        let raw = encode(&[task]);
        assert_eq!(raw, r#"[{"id":3,"text":"water plants","completed":true}]"#);
    }

    #[test]
    fn decode_accepts_legacy_field_names_and_assigns_ids() {
        let snapshot =
            decode(r#"[{"texto":"Comprar pan","completada":true},{"texto":"Llamar"}]"#).unwrap();

        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.tasks[0].text, "Comprar pan");
        assert!(snapshot.tasks[0].completed);
        assert!(!snapshot.tasks[1].completed);
        assert_eq!(snapshot.tasks[0].id, TaskId::new(1));
        assert_eq!(snapshot.tasks[1].id, TaskId::new(2));
        assert_eq!(snapshot.next_id, TaskId::new(3));
        assert_eq!(snapshot.reassigned, 2);
    }

    #[test]
    fn decode_reassigns_duplicate_ids_past_the_maximum() {
        let snapshot = decode(
            r#"[{"id":4,"text":"a","completed":false},
                {"id":4,"text":"b","completed":false},
                {"id":0,"text":"c","completed":false}]"#,
        )
        .unwrap();

        let ids: Vec<u64> = snapshot.tasks.iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![4, 5, 6]);
        assert_eq!(snapshot.next_id, TaskId::new(7));
    }

    #[test]
    fn decode_renumbers_when_stored_ids_are_exhausted() {
        let raw = format!(
            r#"[{{"id":{max},"text":"a"}},{{"text":"b"}},{{"id":7,"text":"c"}}]"#,
            max = u64::MAX
        );
        let snapshot = decode(&raw).unwrap();

        let ids: Vec<u64> = snapshot.tasks.iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(snapshot.next_id, TaskId::new(4));
        assert!(snapshot.renumbered);
        let texts: Vec<&str> = snapshot.tasks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn decode_keeps_ids_when_one_slot_remains() {
        let raw = format!(r#"[{{"id":{},"text":"a"}}]"#, u64::MAX - 1);
        let snapshot = decode(&raw).unwrap();

        assert_eq!(snapshot.tasks[0].id, TaskId::new(u64::MAX - 1));
        assert_eq!(snapshot.next_id, TaskId::new(u64::MAX));
        assert!(!snapshot.renumbered);
    }

    #[test]
    fn decode_drops_blank_records() {
        let snapshot = decode(r#"[{"text":"  ","completed":false},{"text":"x"}]"#).unwrap();
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.dropped, 1);
    }

    #[test]
    fn decode_rejects_non_list_values() {
        assert!(decode("null").is_err());
        assert!(decode("{\"text\":\"x\"}").is_err());
        assert!(decode("[{\"completed\":true}]").is_err());
        assert!(decode("not json").is_err());
    }
}
