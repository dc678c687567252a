//! Board synchronization: the UI-facing side of the board.
//!
//! [`BoardSync`] ties one project's [`BoardEngine`] to a
//! [`PersistenceGateway`] and, once attached, to a [`LiveFeed`]. Every
//! submitted mutation is applied to the engine (optimistically for moves),
//! sent to the gateway with a deadline, and settled when the response
//! arrives. Board change handlers are notified after each visible change.
//!
//! The engine lock is never held across an `.await`; the gateway call is the
//! only suspension point of a mutation.
//!
//! Every change stamps the board with a revision while the engine lock is
//! held. Handlers are called one snapshot at a time and never with a
//! revision older than one already delivered, so the last render always
//! shows the current board even when changes race on several threads.

use std::cell::Cell;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use taskboard_proto::event::LiveUpdateEvent;
use taskboard_proto::task::{Member, ProjectId, Task, TaskDraft, TaskId, TaskPatch, TaskStatus};
use taskboard_proto::wire::GatewayError;

use crate::board::moves::{self, parse_column};
use crate::board::{BoardEngine, BoardError, BoardView, MoveError, MoveIntent, MoveOutcome, MoveTarget};
use crate::gateway::{LiveFeed, PersistenceGateway};
use crate::observer::{Observers, SubscriptionToken};
use crate::session::Session;

/// Default deadline for authoritative calls.
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// One project's board kept in sync with the server.
pub struct BoardSync<G> {
    session: Session,
    project_id: ProjectId,
    gateway: Arc<G>,
    engine: Mutex<BoardEngine>,
    /// Bumped under the engine lock on every visible change.
    revision: AtomicU64,
    /// Revision of the last snapshot handed to handlers. Reentrant so a
    /// handler may change the board from inside the callback.
    delivered: ReentrantMutex<Cell<u64>>,
    observers: Observers<(), BoardView>,
    members: Mutex<Vec<Member>>,
    deadline: Duration,
}

impl<G: PersistenceGateway> BoardSync<G> {
    /// Creates an unloaded board for a project.
    pub fn new(session: &Session, project_id: ProjectId, gateway: Arc<G>) -> Self {
        Self {
            session: session.clone(),
            project_id,
            gateway,
            engine: Mutex::new(BoardEngine::new()),
            revision: AtomicU64::new(0),
            delivered: ReentrantMutex::new(Cell::new(0)),
            observers: Observers::new(),
            members: Mutex::new(Vec::new()),
            deadline: DEFAULT_REQUEST_DEADLINE,
        }
    }

    /// Sets the deadline applied to every authoritative call.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// The project this board shows.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Registers a handler called with the board after every change.
    pub fn on_board_changed(
        &self,
        handler: impl Fn(&BoardView) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.observers.subscribe(None, handler)
    }

    /// Removes a board change handler.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.observers.unsubscribe(token)
    }

    /// A snapshot of the current board, if loaded.
    #[must_use]
    pub fn view(&self) -> Option<BoardView> {
        self.engine.lock().view().cloned()
    }

    /// Members of the project as of the last load.
    #[must_use]
    pub fn members(&self) -> Vec<Member> {
        self.members.lock().clone()
    }

    /// Number of moves awaiting confirmation.
    #[must_use]
    pub fn pending_moves(&self) -> usize {
        self.engine.lock().pending_moves()
    }

    /// Fetches tasks and members and rebuilds the board.
    ///
    /// Discards any pending optimistic state.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the previous board is kept in that case.
    pub async fn load(&self) -> Result<BoardView, BoardError> {
        let records = self.call(self.gateway.list_tasks(self.project_id)).await?;
        let members = self.call(self.gateway.list_members(self.project_id)).await?;
        *self.members.lock() = members;

        let view = self.mutate(|engine| (engine.load(self.project_id, records).clone(), true));
        tracing::info!(
            project_id = %self.project_id,
            user_id = %self.session.user_id(),
            tasks = view.len(),
            "board loaded"
        );
        Ok(view)
    }

    /// Drops the board; later events are ignored until the next load.
    pub fn unload(&self) {
        self.engine.lock().unload();
    }

    /// Applies a move optimistically and persists a column change.
    ///
    /// Same-column reorders are local only. A rejected move is rolled back;
    /// a move of a task the server no longer knows also removes the task.
    /// A response arriving after a reload discarded the move changes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Gateway`] when the authoritative update fails.
    pub async fn submit_move_intent(&self, intent: MoveIntent) -> Result<MoveOutcome, BoardError> {
        let (outcome, handle) = self.mutate(|engine| {
            let applied = engine.apply_tracked_move(intent);
            (applied, applied.0 != MoveOutcome::Noop)
        });

        let (MoveOutcome::Moved { task_id, to, .. }, Some(handle)) = (outcome, handle) else {
            return Ok(outcome);
        };

        match self
            .call(self.gateway.update_task(task_id, TaskPatch::status(to)))
            .await
        {
            Ok(record) => {
                let authoritative = match Task::try_from(record) {
                    Ok(task) => Some(task),
                    Err(e) => {
                        tracing::warn!(%task_id, error = %e, "unreadable task in move response");
                        None
                    }
                };
                self.mutate(|engine| {
                    let before = engine.view().cloned();
                    engine.settle(handle, true, authoritative);
                    ((), engine.view() != before.as_ref())
                });
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(%task_id, error = %e, "move rejected, rolling back");
                let not_found = matches!(e, GatewayError::NotFound(_));
                self.mutate(|engine| {
                    let settled = engine.settle(handle, false, None);
                    if settled && not_found {
                        engine.remove_task(task_id);
                    }
                    ((), settled)
                });
                Err(e.into())
            }
        }
    }

    /// Moves a task to the end of the column named by `new_status`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Move`] for an unknown column key or a task
    /// that is not on the board, before anything is changed; otherwise as
    /// [`submit_move_intent`](Self::submit_move_intent).
    pub async fn submit_status_change(
        &self,
        task_id: TaskId,
        new_status: &str,
    ) -> Result<MoveOutcome, BoardError> {
        let to = parse_column(new_status)?;
        let from = self.current_column(task_id)?;
        self.submit_move_intent(MoveIntent::new(task_id, from, to, MoveTarget::End))
            .await
    }

    /// Moves a task dropped onto a column key or onto another task.
    ///
    /// # Errors
    ///
    /// As [`submit_status_change`](Self::submit_status_change).
    pub async fn submit_drop(&self, task_id: TaskId, over: &str) -> Result<MoveOutcome, BoardError> {
        let intent = {
            let engine = self.engine.lock();
            let view = engine.view().ok_or(BoardError::NotLoaded)?;
            moves::resolve_drop(view, task_id, over)?
        };
        self.submit_move_intent(intent).await
    }

    /// Creates a task in this board's project.
    ///
    /// Not optimistic: the task appears once the server has stored it
    /// (unless its live update got there first).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Gateway`] when the server rejects the draft.
    pub async fn submit_create(&self, mut draft: TaskDraft) -> Result<Task, BoardError> {
        draft.project_id = self.project_id;
        let record = self.call(self.gateway.create_task(draft)).await?;
        let task = Task::try_from(record).map_err(GatewayError::from)?;
        let created = task.clone();
        self.mutate(|engine| ((), engine.insert_task(created)));
        tracing::info!(task_id = %task.id, status = %task.status, "task created");
        Ok(task)
    }

    /// Deletes a task.
    ///
    /// Not optimistic: the task is removed once the server confirms, or
    /// when the server reports it missing.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Gateway`] when the delete fails.
    pub async fn submit_delete(&self, task_id: TaskId) -> Result<(), BoardError> {
        let result = self.call(self.gateway.delete_task(task_id)).await;
        if matches!(result, Ok(()) | Err(GatewayError::NotFound(_))) {
            self.mutate(|engine| ((), engine.remove_task(task_id)));
        }
        result.map_err(Into::into)
    }

    /// Merges a live update event.
    pub fn apply_remote_event(&self, event: &LiveUpdateEvent) {
        self.mutate(|engine| ((), engine.apply_remote_event(event)));
    }

    fn current_column(&self, task_id: TaskId) -> Result<TaskStatus, BoardError> {
        let engine = self.engine.lock();
        let view = engine.view().ok_or(BoardError::NotLoaded)?;
        let (status, _) = view
            .locate(task_id)
            .ok_or(MoveError::UnknownTask(task_id))?;
        Ok(status)
    }

    /// Runs `f` under the engine lock, then notifies if it reports a change.
    fn mutate<R>(&self, f: impl FnOnce(&mut BoardEngine) -> (R, bool)) -> R {
        let (result, snapshot) = {
            let mut engine = self.engine.lock();
            let (result, changed) = f(&mut engine);
            let snapshot = if changed {
                engine
                    .view()
                    .cloned()
                    .map(|view| (self.revision.fetch_add(1, Ordering::Relaxed) + 1, view))
            } else {
                None
            };
            (result, snapshot)
        };
        if let Some((revision, view)) = snapshot {
            self.deliver(revision, &view);
        }
        result
    }

    /// Hands a snapshot to the handlers unless a newer one already went out.
    fn deliver(&self, revision: u64, view: &BoardView) {
        let delivered = self.delivered.lock();
        if revision <= delivered.get() {
            tracing::trace!(revision, latest = delivered.get(), "skipping superseded board snapshot");
            return;
        }
        delivered.set(revision);
        self.observers.notify((), view);
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        tokio::time::timeout(self.deadline, request)
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(
                    deadline_ms = u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX),
                    "request deadline exceeded"
                );
                Err(GatewayError::NetworkFailure("deadline exceeded".to_string()))
            })
    }
}

impl<G: PersistenceGateway + 'static> BoardSync<G> {
    /// Joins the project's live channel and routes its events to the board.
    ///
    /// The feed holds only a weak reference; dropping the board stops
    /// delivery.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Gateway`] if joining the channel fails.
    pub async fn attach<F: LiveFeed>(self: &Arc<Self>, feed: &F) -> Result<SubscriptionToken, BoardError> {
        feed.join(self.project_id).await?;
        let board: Weak<Self> = Arc::downgrade(self);
        let token = feed.subscribe(None, move |event| {
            if let Some(board) = board.upgrade() {
                board.apply_remote_event(event);
            }
        });
        tracing::debug!(project_id = %self.project_id, "attached to live feed");
        Ok(token)
    }

    /// Stops routing events and leaves the project's live channel.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Gateway`] if leaving the channel fails.
    pub async fn detach<F: LiveFeed>(&self, feed: &F, token: SubscriptionToken) -> Result<(), BoardError> {
        feed.unsubscribe(token);
        feed.leave(self.project_id).await?;
        Ok(())
    }
}
