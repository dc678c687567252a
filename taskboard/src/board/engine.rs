//! Board reconciliation engine.
//!
//! [`BoardEngine`] owns the [`BoardView`] of one project for one client and
//! serializes every mutation: authoritative loads, optimistic local moves,
//! move confirmations, and remote live updates.
//!
//! Each cross-column move is recorded as a pending move holding an undo
//! command for the board as it was just before the move. While any move is
//! pending, every later mutation is also appended to a journal. Rejecting a
//! move undoes it and replays the journal entries recorded after it, so
//! remote truth that arrived in the meantime survives the rollback. With
//! nothing interleaved the board is restored exactly.

use std::collections::VecDeque;

use taskboard_proto::event::LiveUpdateEvent;
use taskboard_proto::task::{ProjectId, Task, TaskId, TaskRecord};

use super::moves::{self, MoveIntent, MoveOutcome, PendingMove};
use super::reconcile;
use super::BoardView;

/// A mutation applied while moves were pending.
#[derive(Debug, Clone)]
enum Step {
    /// An optimistic local move or reorder.
    Local(MoveIntent),
    /// Authoritative task replacing an optimistic one.
    Confirm(Task),
    /// A merged live update.
    Remote(LiveUpdateEvent),
    /// A confirmed create.
    Insert(Task),
    /// A confirmed delete (or a task the server no longer knows).
    Remove(TaskId),
}

/// Identifies one pending move.
///
/// Sequence numbers keep increasing across loads, so a handle taken before
/// a reload never matches a move made after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoveHandle {
    seq: u64,
    task_id: TaskId,
}

impl MoveHandle {
    /// The moved task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }
}

/// Per-project board state with optimistic mutations and rollback.
#[derive(Debug, Default)]
pub struct BoardEngine {
    view: Option<BoardView>,
    /// In-flight moves in issue order.
    pending: VecDeque<PendingMove>,
    /// Steps recorded since the oldest pending move, tagged with a sequence.
    journal: Vec<(u64, Step)>,
    next_seq: u64,
}

impl BoardEngine {
    /// Creates an engine with no board loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current board, if loaded.
    #[must_use]
    pub const fn view(&self) -> Option<&BoardView> {
        self.view.as_ref()
    }

    /// Number of moves awaiting confirmation.
    #[must_use]
    pub fn pending_moves(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if a move of the task awaits confirmation.
    #[must_use]
    pub fn is_pending(&self, task_id: TaskId) -> bool {
        self.pending.iter().any(|p| p.task_id == task_id)
    }

    /// Replaces the board with authoritative records.
    ///
    /// Discards any pending optimistic state.
    pub fn load(&mut self, project_id: ProjectId, records: Vec<TaskRecord>) -> &BoardView {
        if !self.pending.is_empty() {
            tracing::debug!(
                %project_id,
                dropped = self.pending.len(),
                "discarding pending moves on load"
            );
        }
        self.pending.clear();
        self.journal.clear();
        self.view.insert(reconcile::load(project_id, records))
    }

    /// Drops the board; later events are ignored until the next load.
    pub fn unload(&mut self) {
        self.view = None;
        self.pending.clear();
        self.journal.clear();
    }

    /// Applies a move optimistically.
    ///
    /// A cross-column move becomes pending until [`confirm_move`] is called
    /// for its task. Never fails; without a board, or for a task that is not
    /// on it, the move is a no-op.
    ///
    /// [`confirm_move`]: Self::confirm_move
    pub fn apply_local_move(&mut self, intent: MoveIntent) -> MoveOutcome {
        self.apply_tracked_move(intent).0
    }

    /// Applies a move optimistically and returns a handle to settle it by.
    ///
    /// The handle is `Some` exactly when the outcome is
    /// [`MoveOutcome::Moved`].
    pub fn apply_tracked_move(&mut self, intent: MoveIntent) -> (MoveOutcome, Option<MoveHandle>) {
        let Some(view) = self.view.as_mut() else {
            return (MoveOutcome::Noop, None);
        };
        let before = view.clone();
        let outcome = moves::apply(view, &intent);
        let seq = self.bump();

        let handle = match outcome {
            MoveOutcome::Noop => return (outcome, None),
            MoveOutcome::Moved { task_id, .. } => {
                self.pending
                    .push_back(PendingMove::capture(seq, task_id, before));
                Some(MoveHandle { seq, task_id })
            }
            MoveOutcome::Reordered => None,
        };
        if !self.pending.is_empty() {
            self.journal.push((seq, Step::Local(intent)));
        }
        tracing::debug!(task_id = %intent.task_id, %outcome, "local move applied");
        (outcome, handle)
    }

    /// Settles the oldest pending move of a task.
    ///
    /// On success the optimistic task is replaced by `authoritative` when
    /// given. On failure the move is rolled back. Returns `false` if no move
    /// of the task was pending.
    pub fn confirm_move(&mut self, task_id: TaskId, success: bool, authoritative: Option<Task>) -> bool {
        let Some(oldest) = self.pending.iter().find(|p| p.task_id == task_id) else {
            tracing::debug!(%task_id, "no pending move to confirm");
            return false;
        };
        let handle = MoveHandle {
            seq: oldest.seq,
            task_id,
        };
        self.settle(handle, success, authoritative)
    }

    /// Settles the move behind `handle`, as [`confirm_move`] does.
    ///
    /// A handle whose move is no longer pending (already settled, or
    /// discarded by a load) is ignored and `false` is returned.
    ///
    /// [`confirm_move`]: Self::confirm_move
    pub fn settle(&mut self, handle: MoveHandle, success: bool, authoritative: Option<Task>) -> bool {
        let task_id = handle.task_id;
        let Some(position) = self.pending.iter().position(|p| p.seq == handle.seq) else {
            tracing::debug!(%task_id, seq = handle.seq, "ignoring settlement of a move no longer pending");
            return false;
        };
        let Some(pending) = self.pending.remove(position) else {
            return false;
        };

        if success {
            // A later move of the same task keeps its optimistic column.
            if let Some(task) = authoritative.filter(|_| !self.is_pending(task_id)) {
                let seq = self.bump();
                if let Some(view) = self.view.as_mut() {
                    reconcile::replace_existing(view, task.clone());
                }
                self.record(seq, Step::Confirm(task));
            }
        } else {
            self.rollback(pending);
        }
        self.prune_journal();
        true
    }

    /// Merges a live update. Returns `true` if the board changed.
    ///
    /// Events arriving before a load, or for another project, are discarded.
    pub fn apply_remote_event(&mut self, event: &LiveUpdateEvent) -> bool {
        let Some(view) = self.view.as_mut() else {
            tracing::debug!(kind = %event.kind(), "discarding event, no board loaded");
            return false;
        };
        if event.project_id != view.project_id() {
            return false;
        }
        let changed = reconcile::apply_remote_event(view, event);
        let seq = self.bump();
        self.record(seq, Step::Remote(event.clone()));
        changed
    }

    /// Adds a confirmed new task unless it is already shown.
    pub fn insert_task(&mut self, task: Task) -> bool {
        let Some(view) = self.view.as_mut() else {
            return false;
        };
        if task.project_id != view.project_id() {
            return false;
        }
        let changed = reconcile::insert_if_absent(view, task.clone());
        let seq = self.bump();
        self.record(seq, Step::Insert(task));
        changed
    }

    /// Removes a task from the board. Absence is not an error.
    pub fn remove_task(&mut self, task_id: TaskId) -> bool {
        let Some(view) = self.view.as_mut() else {
            return false;
        };
        let changed = view.remove(task_id).is_some();
        let seq = self.bump();
        self.record(seq, Step::Remove(task_id));
        changed
    }

    const fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn record(&mut self, seq: u64, step: Step) {
        if !self.pending.is_empty() {
            self.journal.push((seq, step));
        }
    }

    /// Undoes `failed` and replays everything recorded after it.
    ///
    /// Later pending moves get fresh undo commands captured during the
    /// replay, since their old ones still contain the failed move.
    fn rollback(&mut self, failed: PendingMove) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        let failed_seq = failed.seq;
        let task_id = failed.task_id;
        failed.undo(view);

        let mut replayed = 0;
        for (seq, step) in self.journal.iter().filter(|(seq, _)| *seq > failed_seq) {
            if let Some(later) = self.pending.iter_mut().find(|p| p.seq == *seq) {
                *later = PendingMove::capture(later.seq, later.task_id, view.clone());
            }
            replay(view, step);
            replayed += 1;
        }
        self.journal.retain(|(seq, _)| *seq != failed_seq);
        tracing::debug!(%task_id, replayed, "move rolled back");
    }

    /// Drops journal entries no pending move can need.
    fn prune_journal(&mut self) {
        match self.pending.front() {
            None => self.journal.clear(),
            Some(oldest) => {
                let floor = oldest.seq;
                self.journal.retain(|(seq, _)| *seq >= floor);
            }
        }
    }
}

fn replay(view: &mut BoardView, step: &Step) {
    match step {
        Step::Local(intent) => {
            moves::apply(view, intent);
        }
        Step::Confirm(task) => {
            reconcile::replace_existing(view, task.clone());
        }
        Step::Remote(event) => {
            reconcile::apply_remote_event(view, event);
        }
        Step::Insert(task) => {
            reconcile::insert_if_absent(view, task.clone());
        }
        Step::Remove(task_id) => {
            view.remove(*task_id);
        }
    }
}
