//! Move/transition protocol.
//!
//! A [`MoveIntent`] describes a drag-drop or status-selector action. The
//! three statuses are fully connected, so any column may move to any other;
//! the only client-side check is that the destination is a known column key.
//! Unknown keys are rejected before the board is touched.

use std::fmt;

use taskboard_proto::task::{TaskId, TaskStatus};

use super::BoardView;

/// Errors raised while building a move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// The destination is not one of the three column keys.
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    /// The task is not on the board.
    #[error("task {0} is not on the board")]
    UnknownTask(TaskId),
    /// No board is loaded.
    #[error("board not loaded")]
    NotLoaded,
}

/// Where in the destination column a moved task lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget {
    /// Append to the end of the column.
    End,
    /// Insert at an index, clamped to the column length.
    Index(usize),
    /// Take the position of another task in the column.
    Anchor(TaskId),
}

/// A request to move a task, consumed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveIntent {
    /// Task being moved.
    pub task_id: TaskId,
    /// Column the task was dragged from.
    pub from: TaskStatus,
    /// Destination column.
    pub to: TaskStatus,
    /// Position within the destination column.
    pub target: MoveTarget,
}

impl MoveIntent {
    /// Creates an intent from typed columns.
    #[must_use]
    pub const fn new(task_id: TaskId, from: TaskStatus, to: TaskStatus, target: MoveTarget) -> Self {
        Self {
            task_id,
            from,
            to,
            target,
        }
    }

    /// Creates an intent from raw column keys, failing closed on unknown keys.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError::UnknownColumn`] if either key is not a column.
    pub fn from_keys(
        task_id: TaskId,
        from: &str,
        to: &str,
        target: MoveTarget,
    ) -> Result<Self, MoveError> {
        Ok(Self::new(task_id, parse_column(from)?, parse_column(to)?, target))
    }

    /// Returns `true` if the task changes column.
    #[must_use]
    pub fn is_cross_column(&self) -> bool {
        self.from != self.to
    }
}

/// Result of applying a move to a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Nothing changed.
    Noop,
    /// Reordered within a column; nothing to persist.
    Reordered,
    /// Moved across columns; the new status must be persisted.
    Moved {
        /// Task that moved.
        task_id: TaskId,
        /// Column it left.
        from: TaskStatus,
        /// Column it joined.
        to: TaskStatus,
    },
}

impl fmt::Display for MoveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noop => f.write_str("noop"),
            Self::Reordered => f.write_str("reordered"),
            Self::Moved { from, to, .. } => write!(f, "moved {from} -> {to}"),
        }
    }
}

/// Parses a column key.
///
/// # Errors
///
/// Returns [`MoveError::UnknownColumn`] for anything but the three keys.
pub fn parse_column(key: &str) -> Result<TaskStatus, MoveError> {
    key.parse()
        .map_err(|_| MoveError::UnknownColumn(key.to_string()))
}

/// Resolves a drop of `task_id` onto `over` into an intent.
///
/// `over` is either a column key (the task goes to the end of that column)
/// or the id of another task on the board (the task goes to that task's
/// column, at its position).
///
/// # Errors
///
/// Returns [`MoveError::UnknownTask`] if the dragged task is not on the
/// board, or [`MoveError::UnknownColumn`] if `over` names neither a column
/// nor a task on the board.
pub fn resolve_drop(view: &BoardView, task_id: TaskId, over: &str) -> Result<MoveIntent, MoveError> {
    let (from, _) = view.locate(task_id).ok_or(MoveError::UnknownTask(task_id))?;

    if let Ok(to) = over.parse::<TaskStatus>() {
        return Ok(MoveIntent::new(task_id, from, to, MoveTarget::End));
    }

    let anchor = over
        .parse::<TaskId>()
        .ok()
        .and_then(|id| view.locate(id).map(|(status, _)| (id, status)));
    match anchor {
        Some((anchor_id, to)) => Ok(MoveIntent::new(task_id, from, to, MoveTarget::Anchor(anchor_id))),
        None => Err(MoveError::UnknownColumn(over.to_string())),
    }
}

/// Applies an intent to a board.
///
/// The task's current column is authoritative for the source; a stale
/// `from` is ignored. A task that is not on the board is a no-op.
pub(crate) fn apply(view: &mut BoardView, intent: &MoveIntent) -> MoveOutcome {
    let Some((from, index)) = view.locate(intent.task_id) else {
        return MoveOutcome::Noop;
    };
    if from != intent.from {
        tracing::debug!(
            task_id = %intent.task_id,
            stated = %intent.from,
            actual = %from,
            "move source differs from board"
        );
    }

    if from == intent.to {
        reorder(view, from, index, intent.target)
    } else {
        let column = view.column_mut(from);
        let mut task = column.remove(index);
        task.status = intent.to;
        let dest = view.column_mut(intent.to);
        let at = match intent.target {
            MoveTarget::End => dest.len(),
            MoveTarget::Index(i) => i.min(dest.len()),
            MoveTarget::Anchor(anchor) => dest
                .iter()
                .position(|t| t.id == anchor)
                .unwrap_or(dest.len()),
        };
        dest.insert(at, task);
        MoveOutcome::Moved {
            task_id: intent.task_id,
            from,
            to: intent.to,
        }
    }
}

fn reorder(view: &mut BoardView, status: TaskStatus, index: usize, target: MoveTarget) -> MoveOutcome {
    let column = view.column_mut(status);
    let last = column.len() - 1;
    let to = match target {
        MoveTarget::End => last,
        MoveTarget::Index(i) => i.min(last),
        MoveTarget::Anchor(anchor) => column
            .iter()
            .position(|t| t.id == anchor)
            .unwrap_or(last),
    };
    if to == index {
        return MoveOutcome::Noop;
    }
    let task = column.remove(index);
    column.insert(to, task);
    MoveOutcome::Reordered
}

/// An optimistic move awaiting confirmation.
///
/// Carries an undo command captured when the move was applied.
pub(crate) struct PendingMove {
    pub(crate) seq: u64,
    pub(crate) task_id: TaskId,
    undo: Box<dyn FnOnce(&mut BoardView) + Send>,
}

impl PendingMove {
    /// Captures the board as it was before the move.
    pub(crate) fn capture(seq: u64, task_id: TaskId, before: BoardView) -> Self {
        Self {
            seq,
            task_id,
            undo: Box::new(move |view| *view = before),
        }
    }

    /// Restores the captured board.
    pub(crate) fn undo(self, view: &mut BoardView) {
        (self.undo)(view);
    }
}

impl fmt::Debug for PendingMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingMove")
            .field("seq", &self.seq)
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}
