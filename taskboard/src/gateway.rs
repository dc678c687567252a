//! Seams between the board and the server.
//!
//! [`PersistenceGateway`] is the authoritative request/response API;
//! [`LiveFeed`] delivers best-effort live update events. The WebSocket
//! [`ChannelClient`](crate::transport::ChannelClient) implements both, and
//! tests may substitute either.

use std::future::Future;

use taskboard_proto::event::{EventKind, LiveUpdateEvent};
use taskboard_proto::task::{Member, ProjectId, TaskDraft, TaskId, TaskPatch, TaskRecord};
use taskboard_proto::wire::GatewayError;

use crate::observer::SubscriptionToken;

/// Authorized reads and writes of tasks.
pub trait PersistenceGateway: Send + Sync {
    /// Creates a task. The status defaults to `todo` when the draft has none.
    fn create_task(
        &self,
        draft: TaskDraft,
    ) -> impl Future<Output = Result<TaskRecord, GatewayError>> + Send;

    /// Updates fields of a task and returns the stored task.
    fn update_task(
        &self,
        task_id: TaskId,
        patch: TaskPatch,
    ) -> impl Future<Output = Result<TaskRecord, GatewayError>> + Send;

    /// Deletes a task.
    fn delete_task(&self, task_id: TaskId) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Lists all tasks of a project.
    fn list_tasks(
        &self,
        project_id: ProjectId,
    ) -> impl Future<Output = Result<Vec<TaskRecord>, GatewayError>> + Send;

    /// Lists the members of a project, owner included.
    fn list_members(
        &self,
        project_id: ProjectId,
    ) -> impl Future<Output = Result<Vec<Member>, GatewayError>> + Send;
}

/// Source of live update events for project channels.
pub trait LiveFeed: Send + Sync {
    /// Starts receiving events of a project's channel.
    fn join(&self, project_id: ProjectId) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Stops receiving events of a project's channel.
    fn leave(&self, project_id: ProjectId) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Registers a handler for one event kind, or for all kinds when `None`.
    fn subscribe(
        &self,
        kind: Option<EventKind>,
        handler: impl Fn(&LiveUpdateEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken;

    /// Removes a handler. Returns `false` if the token was unknown.
    fn unsubscribe(&self, token: SubscriptionToken) -> bool;
}
