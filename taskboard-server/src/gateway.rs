//! Authoritative request handling.
//!
//! The [`Gateway`] executes one [`RequestBody`] on behalf of an identified
//! caller against the [`TaskStore`], and publishes the matching live update
//! through the [`Broadcaster`] once the mutation has been applied.
//!
//! Each task mutation and its publish run under one write-order lock, so
//! subscribers receive events in the order the store applied the writes.

use taskboard_proto::event::{LiveUpdate, ProjectChannel};
use taskboard_proto::task::{TaskRecord, UserId};
use taskboard_proto::wire::{GatewayError, RequestBody, ResponseBody};
use tokio::sync::Mutex;

use crate::broadcast::{Broadcaster, ConnectionId, Outbox};
use crate::store::TaskStore;

/// The connection a request arrived on.
pub struct Caller<'a> {
    /// Identified user.
    pub user_id: UserId,
    /// Connection id, used as the subscriber key.
    pub connection: ConnectionId,
    /// Outbound queue of the connection, registered on subscribe.
    pub outbox: &'a Outbox,
}

/// Store plus broadcaster.
#[derive(Default)]
pub struct Gateway {
    /// Authoritative store.
    pub store: TaskStore,
    /// Live update fan-out.
    pub broadcaster: Broadcaster,
    /// Held from a mutation until its event is queued.
    write_order: Mutex<()>,
}

impl Gateway {
    /// Creates a gateway over an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes a request for `caller`.
    ///
    /// # Errors
    ///
    /// Returns the [`GatewayError`] the store reported; nothing is published
    /// in that case.
    pub async fn handle(
        &self,
        caller: &Caller<'_>,
        body: RequestBody,
    ) -> Result<ResponseBody, GatewayError> {
        let user = caller.user_id;
        match body {
            RequestBody::Subscribe { project_id } => {
                self.store.authorize(project_id, user).await?;
                self.broadcaster
                    .subscribe(
                        ProjectChannel::new(project_id),
                        caller.connection,
                        caller.outbox.clone(),
                    )
                    .await;
                Ok(ResponseBody::Subscribed)
            }
            RequestBody::Unsubscribe { project_id } => {
                self.broadcaster
                    .unsubscribe(ProjectChannel::new(project_id), caller.connection)
                    .await;
                Ok(ResponseBody::Unsubscribed)
            }
            RequestBody::CreateTask(draft) => {
                let _ordered = self.write_order.lock().await;
                let task = self.store.create_task(user, draft).await?;
                let record = TaskRecord::from(task);
                tracing::info!(task_id = %record.id, project_id = %record.project_id, "task created");
                self.broadcaster
                    .publish(
                        ProjectChannel::new(record.project_id),
                        LiveUpdate::TaskCreated(record.clone()),
                    )
                    .await;
                Ok(ResponseBody::Task(record))
            }
            RequestBody::UpdateTask { task_id, patch } => {
                let _ordered = self.write_order.lock().await;
                let task = self.store.update_task(user, task_id, patch).await?;
                let record = TaskRecord::from(task);
                tracing::info!(%task_id, status = %record.status, "task updated");
                self.broadcaster
                    .publish(
                        ProjectChannel::new(record.project_id),
                        LiveUpdate::TaskUpdated(record.clone()),
                    )
                    .await;
                Ok(ResponseBody::Task(record))
            }
            RequestBody::DeleteTask { task_id } => {
                let _ordered = self.write_order.lock().await;
                let task = self.store.delete_task(user, task_id).await?;
                tracing::info!(%task_id, project_id = %task.project_id, "task deleted");
                self.broadcaster
                    .publish(
                        ProjectChannel::new(task.project_id),
                        LiveUpdate::TaskDeleted(task_id),
                    )
                    .await;
                Ok(ResponseBody::Deleted)
            }
            RequestBody::ListTasks { project_id } => {
                let tasks = self.store.list_tasks(user, project_id).await?;
                Ok(ResponseBody::Tasks(
                    tasks.into_iter().map(TaskRecord::from).collect(),
                ))
            }
            RequestBody::ListMembers { project_id } => {
                let members = self.store.list_members(project_id, user).await?;
                Ok(ResponseBody::Members(members))
            }
            RequestBody::CreateProject { name } => {
                let project_id = self.store.create_project(user, &name).await?;
                tracing::info!(%project_id, owner = %user, "project created");
                Ok(ResponseBody::ProjectCreated { project_id })
            }
            RequestBody::InviteMember { project_id, email } => {
                let member = self.store.invite_member(project_id, user, &email).await?;
                tracing::info!(%project_id, member = %member.user_id, "member added");
                Ok(ResponseBody::MemberAdded(member))
            }
            RequestBody::DeleteProject { project_id } => {
                let _ordered = self.write_order.lock().await;
                let removed = self.store.delete_project(project_id, user).await?;
                let dropped = self
                    .broadcaster
                    .close_channel(ProjectChannel::new(project_id))
                    .await;
                tracing::info!(%project_id, tasks = removed, subscribers = dropped, "project deleted");
                Ok(ResponseBody::ProjectDeleted)
            }
            RequestBody::ListProjects => Ok(ResponseBody::Projects(self.store.list_projects(user).await)),
            RequestBody::RenameProject { project_id, name } => {
                let project = self.store.rename_project(project_id, user, &name).await?;
                tracing::info!(%project_id, name = %project.name, "project renamed");
                Ok(ResponseBody::ProjectRenamed(project))
            }
            RequestBody::SearchUsers { query } => {
                let users = self.store.search_users(&query).await?;
                tracing::debug!(matches = users.len(), "user search");
                Ok(ResponseBody::Users(users))
            }
        }
    }
}
