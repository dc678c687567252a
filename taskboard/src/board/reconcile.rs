//! Pure reconciliation functions over a [`BoardView`].
//!
//! Loading groups authoritative records into columns; merging applies one
//! live update event. Merges are idempotent: applying the same event twice
//! leaves the board as applying it once.

use taskboard_proto::event::{LiveUpdate, LiveUpdateEvent};
use taskboard_proto::task::{ProjectId, Task, TaskRecord};

use super::BoardView;

/// Builds a board from authoritative records, in the order given.
///
/// Records with an unknown status, records for another project, and
/// duplicate ids are dropped with a warning.
#[must_use]
pub fn load(project_id: ProjectId, records: Vec<TaskRecord>) -> BoardView {
    let mut view = BoardView::empty(project_id);
    for record in records {
        let Some(task) = to_task(project_id, record) else {
            continue;
        };
        if view.contains(task.id) {
            tracing::warn!(task_id = %task.id, "duplicate task in listing, keeping first");
            continue;
        }
        view.column_mut(task.status).push(task);
    }
    tracing::debug!(%project_id, tasks = view.len(), "board loaded");
    view
}

/// Merges one live update into the board.
///
/// Returns `true` if the board changed. Events for another project are
/// discarded.
pub fn apply_remote_event(view: &mut BoardView, event: &LiveUpdateEvent) -> bool {
    if event.project_id != view.project_id() {
        tracing::debug!(
            board = %view.project_id(),
            event_project = %event.project_id,
            "discarding event for another project"
        );
        return false;
    }

    match &event.update {
        LiveUpdate::TaskCreated(record) => match to_task(view.project_id(), record.clone()) {
            Some(task) => insert_if_absent(view, task),
            None => false,
        },
        LiveUpdate::TaskUpdated(record) => match to_task(view.project_id(), record.clone()) {
            Some(task) => upsert(view, task),
            // Unknown status: the task can no longer be shown in any column.
            None if record.project_id == view.project_id() => view.remove(record.id).is_some(),
            None => false,
        },
        LiveUpdate::TaskDeleted(task_id) => view.remove(*task_id).is_some(),
    }
}

/// Appends a task to its column unless its id is already on the board.
pub(crate) fn insert_if_absent(view: &mut BoardView, task: Task) -> bool {
    if view.contains(task.id) {
        return false;
    }
    view.column_mut(task.status).push(task);
    true
}

/// Places a task in the column matching its status.
///
/// A task already in that column is replaced in place; one in another
/// column is moved to the end of the new column; an absent one is appended.
pub(crate) fn upsert(view: &mut BoardView, task: Task) -> bool {
    match view.locate(task.id) {
        Some((status, index)) if status == task.status => {
            let slot = &mut view.column_mut(status)[index];
            if *slot == task {
                return false;
            }
            *slot = task;
            true
        }
        Some(_) => {
            view.remove(task.id);
            view.column_mut(task.status).push(task);
            true
        }
        None => {
            view.column_mut(task.status).push(task);
            true
        }
    }
}

/// Like [`upsert`], but never adds a task that is not on the board.
pub(crate) fn replace_existing(view: &mut BoardView, task: Task) -> bool {
    if view.contains(task.id) {
        upsert(view, task)
    } else {
        false
    }
}

fn to_task(project_id: ProjectId, record: TaskRecord) -> Option<Task> {
    if record.project_id != project_id {
        tracing::warn!(
            task_id = %record.id,
            task_project = %record.project_id,
            %project_id,
            "dropping task from another project"
        );
        return None;
    }
    let task_id = record.id;
    match Task::try_from(record) {
        Ok(task) => Some(task),
        Err(e) => {
            tracing::warn!(%task_id, error = %e, "dropping task with unknown status");
            None
        }
    }
}
