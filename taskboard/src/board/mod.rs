//! Client-side Kanban board state.
//!
//! A [`BoardView`] holds the tasks of one project grouped into the three
//! status columns. It is rebuilt wholesale on load and patched
//! incrementally by optimistic local moves and incoming live updates; the
//! [`BoardEngine`] owns that lifecycle.
//!
//! Invariant: a task id appears in at most one column at any instant.

pub mod engine;
pub mod moves;
pub mod reconcile;

pub use engine::{BoardEngine, MoveHandle};
pub use moves::{MoveError, MoveIntent, MoveOutcome, MoveTarget};

use std::fmt;

use serde::Serialize;
use taskboard_proto::task::{ProjectId, Task, TaskId, TaskStatus};
use taskboard_proto::wire::GatewayError;

/// Errors from board-level operations.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// No board has been loaded yet (or it was unloaded).
    #[error("board not loaded")]
    NotLoaded,
    /// The move was rejected before touching the board.
    #[error(transparent)]
    Move(#[from] MoveError),
    /// The authoritative call failed; optimistic changes were rolled back.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// Board could not be serialized.
    #[error("failed to export board: {0}")]
    Export(#[from] serde_json::Error),
}

impl BoardError {
    /// Returns the gateway error, if this is one.
    #[must_use]
    pub const fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            Self::Gateway(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if the failed operation may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(e) if e.is_retryable())
    }
}

/// Number of tasks in each column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColumnCounts {
    /// Tasks in `todo`.
    pub todo: usize,
    /// Tasks in `in_progress`.
    pub in_progress: usize,
    /// Tasks in `done`.
    pub done: usize,
}

impl ColumnCounts {
    /// Total number of tasks on the board.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.todo + self.in_progress + self.done
    }
}

/// The tasks of one project grouped by status column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    project_id: ProjectId,
    columns: [Vec<Task>; 3],
}

#[derive(Serialize)]
struct BoardExport<'a> {
    project_id: ProjectId,
    counts: ColumnCounts,
    todo: &'a [Task],
    in_progress: &'a [Task],
    done: &'a [Task],
}

impl BoardView {
    /// Creates an empty board for a project.
    #[must_use]
    pub fn empty(project_id: ProjectId) -> Self {
        Self {
            project_id,
            columns: Default::default(),
        }
    }

    /// Returns the project this board shows.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the tasks of one column in display order.
    #[must_use]
    pub fn column(&self, status: TaskStatus) -> &[Task] {
        &self.columns[status.index()]
    }

    pub(crate) fn column_mut(&mut self, status: TaskStatus) -> &mut Vec<Task> {
        &mut self.columns[status.index()]
    }

    /// Returns the column and index of a task.
    #[must_use]
    pub fn locate(&self, task_id: TaskId) -> Option<(TaskStatus, usize)> {
        TaskStatus::ALL.into_iter().find_map(|status| {
            self.column(status)
                .iter()
                .position(|t| t.id == task_id)
                .map(|index| (status, index))
        })
    }

    /// Returns a task by id.
    #[must_use]
    pub fn get(&self, task_id: TaskId) -> Option<&Task> {
        self.locate(task_id)
            .map(|(status, index)| &self.column(status)[index])
    }

    /// Returns `true` if the task is on the board.
    #[must_use]
    pub fn contains(&self, task_id: TaskId) -> bool {
        self.locate(task_id).is_some()
    }

    /// Iterates over all task ids, column by column.
    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.columns.iter().flatten().map(|t| t.id)
    }

    /// Per-column task counts.
    #[must_use]
    pub fn counts(&self) -> ColumnCounts {
        ColumnCounts {
            todo: self.column(TaskStatus::Todo).len(),
            in_progress: self.column(TaskStatus::InProgress).len(),
            done: self.column(TaskStatus::Done).len(),
        }
    }

    /// Number of tasks on the board.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts().total()
    }

    /// Returns `true` if no column holds a task.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(Vec::is_empty)
    }

    /// Returns `true` if every task id appears at most once.
    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.task_ids().all(|id| seen.insert(id))
    }

    /// Returns `true` if every task sits in the column matching its status.
    #[must_use]
    pub fn is_coherent(&self) -> bool {
        TaskStatus::ALL
            .into_iter()
            .all(|status| self.column(status).iter().all(|t| t.status == status))
    }

    /// Serializes the board (columns and counts) as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Export`] if serialization fails.
    pub fn export_json(&self) -> Result<String, BoardError> {
        let export = BoardExport {
            project_id: self.project_id,
            counts: self.counts(),
            todo: self.column(TaskStatus::Todo),
            in_progress: self.column(TaskStatus::InProgress),
            done: self.column(TaskStatus::Done),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Removes a task, returning it with its former column and index.
    pub(crate) fn remove(&mut self, task_id: TaskId) -> Option<(TaskStatus, usize, Task)> {
        let (status, index) = self.locate(task_id)?;
        let task = self.column_mut(status).remove(index);
        Some((status, index, task))
    }
}

impl fmt::Display for BoardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, status) in TaskStatus::ALL.into_iter().enumerate() {
            if n > 0 {
                writeln!(f)?;
            }
            let column = self.column(status);
            writeln!(f, "{} ({})", status.key().to_uppercase(), column.len())?;
            for task in column {
                write!(f, "  {}  {}", task.id, task.title)?;
                if let Some(assignee) = task.assignee {
                    write!(f, "  @{assignee}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
