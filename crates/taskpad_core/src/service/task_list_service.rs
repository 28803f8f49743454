//! Task list use-case service.
//!
//! # Responsibility
//! - Own the in-memory task list, draft text, edit cursor and view filter.
//! - Write the full list to the injected slot store after every mutation.
//! - Rehydrate from the slot once at startup.
//!
//! # Invariants
//! - Stored task text is never blank; blank adds are ignored and blank edits
//!   keep the previous text.
//! - The edit cursor, when set, targets a task present in the list.
//! - Completion toggles are suppressed for the task being edited.
//! - After every completed mutation (or event turn) the slot holds the
//!   current list.

use crate::model::task::{is_blank, Filter, Task, TaskId};
use crate::snapshot::{self, Snapshot, DEFAULT_SLOT_KEY};
use crate::store::{KeyValueStore, StoreError};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TaskListResult<T> = Result<T, TaskListError>;

/// Service error for task list operations.
#[derive(Debug)]
pub enum TaskListError {
    /// No task with this id exists in the list.
    TaskNotFound(TaskId),
    /// Every task id has been handed out; nothing was added.
    IdsExhausted,
    /// Slot write failed. The in-memory change is kept.
    Store(StoreError),
}

impl Display for TaskListError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::IdsExhausted => write!(f, "no task ids left to assign"),
            Self::Store(err) => write!(f, "failed to persist task list: {err}"),
        }
    }
}

impl Error for TaskListError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TaskNotFound(_) | Self::IdsExhausted => None,
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for TaskListError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Task currently in text-edit mode with its in-progress text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditCursor {
    pub id: TaskId,
    pub text: String,
}

/// Per-filter task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewCounts {
    pub all: usize,
    pub active: usize,
    pub completed: usize,
}

/// Discrete user event understood by [`TaskListService::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    Add(String),
    SetDraft(String),
    SubmitDraft,
    Remove(TaskId),
    Toggle(TaskId),
    BeginEdit(TaskId),
    SetEditText(String),
    /// Explicit save and focus loss both map here.
    CommitEdit(TaskId),
    CancelEdit,
    ClearCompleted,
    SetFilter(Filter),
}

/// Result of applying one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Added(TaskId),
    /// Blank submission; nothing changed.
    Ignored,
    Removed(Task),
    Toggled { id: TaskId, completed: bool },
    /// Toggle refused because the task is being edited.
    ToggleSuppressed(TaskId),
    /// `committed` names a task whose open edit was saved first.
    EditStarted {
        id: TaskId,
        committed: Option<TaskId>,
    },
    EditCommitted { id: TaskId, changed: bool },
    Cleared(usize),
    /// View-only state changed (draft, scratch text, filter, cancel).
    ViewUpdated,
}

impl CommandOutcome {
    fn mutates_list(&self) -> bool {
        matches!(
            self,
            Self::Added(_)
                | Self::Removed(_)
                | Self::Toggled { .. }
                | Self::EditCommitted { .. }
                | Self::Cleared(_)
                | Self::EditStarted {
                    committed: Some(_),
                    ..
                }
        )
    }
}

/// Single-list task manager persisting through an injected slot store.
pub struct TaskListService<S: KeyValueStore> {
    store: S,
    slot_key: String,
    tasks: Vec<Task>,
    /// `None` once the id space is used up.
    next_id: Option<TaskId>,
    draft: String,
    editing: Option<EditCursor>,
    filter: Filter,
}

impl<S: KeyValueStore> TaskListService<S> {
    /// Loads the list from the default slot.
    pub fn initialize(store: S) -> Self {
        Self::initialize_with_key(store, DEFAULT_SLOT_KEY)
    }

    /// Loads the list from `slot_key`.
    ///
    /// Never fails: a missing slot, a malformed value or a store read error
    /// all start an empty list. Nothing is written.
    pub fn initialize_with_key(store: S, slot_key: impl Into<String>) -> Self {
        let slot_key = slot_key.into();
        let snapshot = load_snapshot(&store, &slot_key);

        Self {
            store,
            slot_key,
            tasks: snapshot.tasks,
            next_id: Some(snapshot.next_id),
            draft: String::new(),
            editing: None,
            filter: Filter::default(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn editing(&self) -> Option<&EditCursor> {
        self.editing.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the service and returns the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Tasks passing `filter`, in list order, paired with their ids.
    ///
    /// The iterator is lazy and can be cloned to restart it.
    pub fn view(&self, filter: Filter) -> impl Iterator<Item = (TaskId, &Task)> + Clone + '_ {
        self.tasks
            .iter()
            .filter(move |task| task.matches(filter))
            .map(|task| (task.id, task))
    }

    /// [`Self::view`] with the active filter.
    pub fn visible(&self) -> impl Iterator<Item = (TaskId, &Task)> + Clone + '_ {
        self.view(self.filter)
    }

    pub fn counts(&self) -> ViewCounts {
        let completed = self.tasks.iter().filter(|task| task.completed).count();
        ViewCounts {
            all: self.tasks.len(),
            active: self.tasks.len() - completed,
            completed,
        }
    }

    /// Whether the "clear completed" action applies.
    pub fn has_completed(&self) -> bool {
        self.tasks.iter().any(|task| task.completed)
    }

    /// Appends a task unless `text` is blank.
    ///
    /// Text is stored untrimmed. Clears the draft and persists on success.
    /// Returns `Ok(None)` for blank input.
    pub fn add(&mut self, text: impl Into<String>) -> TaskListResult<Option<TaskId>> {
        match self.dispatch(TaskCommand::Add(text.into()))? {
            CommandOutcome::Added(id) => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    /// Replaces the new-task draft. No persistence.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Adds the current draft as a task.
    pub fn submit_draft(&mut self) -> TaskListResult<Option<TaskId>> {
        match self.dispatch(TaskCommand::SubmitDraft)? {
            CommandOutcome::Added(id) => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    /// Deletes a task and returns it.
    ///
    /// Clears the edit cursor when it targeted the removed task.
    pub fn remove(&mut self, id: TaskId) -> TaskListResult<Task> {
        match self.dispatch(TaskCommand::Remove(id))? {
            CommandOutcome::Removed(task) => Ok(task),
            _ => Err(TaskListError::TaskNotFound(id)),
        }
    }

    /// Flips completion unless the task is being edited.
    ///
    /// Returns `Ok(true)` when the flag changed, `Ok(false)` when suppressed.
    pub fn toggle_completed(&mut self, id: TaskId) -> TaskListResult<bool> {
        let outcome = self.dispatch(TaskCommand::Toggle(id))?;
        Ok(matches!(outcome, CommandOutcome::Toggled { .. }))
    }

    /// Puts a task in edit mode, seeding scratch text with its current text.
    ///
    /// An edit already open on another task is committed first.
    pub fn begin_edit(&mut self, id: TaskId) -> TaskListResult<()> {
        self.dispatch(TaskCommand::BeginEdit(id)).map(|_| ())
    }

    /// Replaces the scratch text of the open edit. No-op without one.
    pub fn set_edit_text(&mut self, text: impl Into<String>) {
        if let Some(cursor) = self.editing.as_mut() {
            cursor.text = text.into();
        }
    }

    /// Ends editing `id`, keeping the previous text when scratch is blank.
    ///
    /// Persists even when the text did not change. Returns whether it changed.
    pub fn commit_edit(&mut self, id: TaskId) -> TaskListResult<bool> {
        match self.dispatch(TaskCommand::CommitEdit(id))? {
            CommandOutcome::EditCommitted { changed, .. } => Ok(changed),
            _ => Ok(false),
        }
    }

    /// Leaves edit mode without touching task text. No persistence.
    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Removes every completed task, preserving the order of the rest.
    ///
    /// Returns how many tasks were removed.
    pub fn clear_completed(&mut self) -> TaskListResult<usize> {
        match self.dispatch(TaskCommand::ClearCompleted)? {
            CommandOutcome::Cleared(removed) => Ok(removed),
            _ => Ok(0),
        }
    }

    /// Changes the view filter. No persistence.
    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
    }

    /// Applies one command, persisting if it changed the list.
    pub fn dispatch(&mut self, command: TaskCommand) -> TaskListResult<CommandOutcome> {
        let outcome = self.apply(command)?;
        if outcome.mutates_list() {
            self.persist()?;
        }
        Ok(outcome)
    }

    /// Applies one event turn and writes the slot once at the end.
    ///
    /// On error the commands applied before the failing one are kept and
    /// persisted, then the command error is returned. A write failure at that
    /// point is logged and does not replace the command error.
    pub fn dispatch_turn(
        &mut self,
        commands: impl IntoIterator<Item = TaskCommand>,
    ) -> TaskListResult<Vec<CommandOutcome>> {
        let mut outcomes = Vec::new();
        let mut dirty = false;

        for command in commands {
            match self.apply(command) {
                Ok(outcome) => {
                    dirty |= outcome.mutates_list();
                    outcomes.push(outcome);
                }
                Err(err) => {
                    if dirty && self.persist().is_err() {
                        warn!(
                            "event=turn_abort module=service status=unsaved key={} error={err}",
                            self.slot_key
                        );
                    }
                    return Err(err);
                }
            }
        }

        if dirty {
            self.persist()?;
        }
        Ok(outcomes)
    }

    fn apply(&mut self, command: TaskCommand) -> TaskListResult<CommandOutcome> {
        let outcome = match command {
            TaskCommand::Add(text) => self.apply_add(text)?,
            TaskCommand::SetDraft(text) => {
                self.draft = text;
                CommandOutcome::ViewUpdated
            }
            TaskCommand::SubmitDraft => {
                let text = self.draft.clone();
                self.apply_add(text)?
            }
            TaskCommand::Remove(id) => {
                let index = self.index_of(id)?;
                if self.is_editing(id) {
                    self.editing = None;
                }
                CommandOutcome::Removed(self.tasks.remove(index))
            }
            TaskCommand::Toggle(id) => {
                let index = self.index_of(id)?;
                if self.is_editing(id) {
                    debug!("event=task_toggle module=service status=suppressed id={id}");
                    return Ok(CommandOutcome::ToggleSuppressed(id));
                }
                let task = &mut self.tasks[index];
                task.completed = !task.completed;
                CommandOutcome::Toggled {
                    id,
                    completed: task.completed,
                }
            }
            TaskCommand::BeginEdit(id) => {
                let index = self.index_of(id)?;
                if self.is_editing(id) {
                    return Ok(CommandOutcome::EditStarted {
                        id,
                        committed: None,
                    });
                }
                // Only one task may be in edit mode; focus moving away saves it.
                let committed = match self.editing.as_ref().map(|cursor| cursor.id) {
                    Some(open) => {
                        self.apply_commit(open)?;
                        Some(open)
                    }
                    None => None,
                };
                self.editing = Some(EditCursor {
                    id,
                    text: self.tasks[index].text.clone(),
                });
                CommandOutcome::EditStarted { id, committed }
            }
            TaskCommand::SetEditText(text) => {
                self.set_edit_text(text);
                CommandOutcome::ViewUpdated
            }
            TaskCommand::CommitEdit(id) => self.apply_commit(id)?,
            TaskCommand::CancelEdit => {
                self.cancel_edit();
                CommandOutcome::ViewUpdated
            }
            TaskCommand::ClearCompleted => {
                let before = self.tasks.len();
                self.tasks.retain(|task| !task.completed);
                let removed = before - self.tasks.len();
                let target_gone = self
                    .editing
                    .as_ref()
                    .is_some_and(|cursor| self.get(cursor.id).is_none());
                if target_gone {
                    self.editing = None;
                }
                CommandOutcome::Cleared(removed)
            }
            TaskCommand::SetFilter(filter) => {
                self.filter = filter;
                CommandOutcome::ViewUpdated
            }
        };
        Ok(outcome)
    }

    fn apply_add(&mut self, text: String) -> TaskListResult<CommandOutcome> {
        if is_blank(&text) {
            return Ok(CommandOutcome::Ignored);
        }
        let id = self.next_id.ok_or(TaskListError::IdsExhausted)?;
        self.next_id = id.next();
        self.tasks.push(Task {
            id,
            text,
            completed: false,
        });
        self.draft.clear();
        Ok(CommandOutcome::Added(id))
    }

    fn apply_commit(&mut self, id: TaskId) -> TaskListResult<CommandOutcome> {
        let index = self.index_of(id)?;
        let scratch = match self.editing.take() {
            Some(cursor) if cursor.id == id => cursor.text,
            // Committing a task that is not the cursor target saves nothing.
            _ => String::new(),
        };

        let changed = !is_blank(&scratch) && self.tasks[index].text != scratch;
        if changed {
            self.tasks[index].text = scratch;
        }
        Ok(CommandOutcome::EditCommitted { id, changed })
    }

    fn index_of(&self, id: TaskId) -> TaskListResult<usize> {
        self.tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(TaskListError::TaskNotFound(id))
    }

    fn is_editing(&self, id: TaskId) -> bool {
        self.editing.as_ref().is_some_and(|cursor| cursor.id == id)
    }

    fn persist(&mut self) -> TaskListResult<()> {
        let raw = snapshot::encode(&self.tasks);
        match self.store.set(&self.slot_key, &raw) {
            Ok(()) => {
                debug!(
                    "event=tasks_persist module=service status=ok key={} count={}",
                    self.slot_key,
                    self.tasks.len()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=tasks_persist module=service status=error key={} error={}",
                    self.slot_key, err
                );
                Err(err.into())
            }
        }
    }
}

fn load_snapshot<S: KeyValueStore>(store: &S, slot_key: &str) -> Snapshot {
    let raw = match store.get(slot_key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            info!("event=tasks_load module=service status=ok key={slot_key} source=empty count=0");
            return Snapshot::empty();
        }
        Err(err) => {
            warn!(
                "event=tasks_load module=service status=fallback key={slot_key} reason=store_read error={err}"
            );
            return Snapshot::empty();
        }
    };

    match snapshot::decode(&raw) {
        Ok(snapshot) => {
            info!(
                "event=tasks_load module=service status=ok key={slot_key} source=slot count={} dropped={} reassigned={} renumbered={}",
                snapshot.tasks.len(),
                snapshot.dropped,
                snapshot.reassigned,
                snapshot.renumbered
            );
            snapshot
        }
        Err(err) => {
            warn!(
                "event=tasks_load module=service status=fallback key={slot_key} reason=malformed error={err}"
            );
            Snapshot::empty()
        }
    }
}
