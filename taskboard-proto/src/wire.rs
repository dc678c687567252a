//! Messages exchanged over the taskboard WebSocket.
//!
//! One socket carries both the authoritative request/response API and the
//! live update channel. The client identifies itself first, then sends
//! [`ClientMessage::Request`]s tagged with a request id; the server answers
//! each with a [`ServerMessage::Response`] carrying the same id and pushes
//! [`ServerMessage::Event`]s for every project channel the socket joined.

use serde::{Deserialize, Serialize};

use crate::event::LiveUpdateEvent;
use crate::task::{
    Member, ProjectId, ProjectSummary, TaskDraft, TaskId, TaskPatch, TaskRecord, UserId,
    ValidationError,
};

/// Correlates a [`ServerMessage::Response`] with its request.
pub type RequestId = u64;

/// Errors reported by the persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum GatewayError {
    /// Caller is not a member of the project (or not its owner, where required).
    #[error("unauthorized")]
    Unauthorized,
    /// The project, task, or user no longer exists.
    #[error("not found: {0}")]
    NotFound(String),
    /// The request input is malformed.
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    /// Transport failure or deadline expiry; the request may be retried.
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// Too many requests; the caller should wait before retrying.
    #[error("rate limited, wait before retrying")]
    RateLimited,
}

impl GatewayError {
    /// Returns `true` for transient errors that a caller may retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::RateLimited)
    }
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationFailed(err.to_string())
    }
}

/// Operations a client may request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestBody {
    /// Join a project's live update channel.
    Subscribe {
        /// Project to follow.
        project_id: ProjectId,
    },
    /// Leave a project's live update channel.
    Unsubscribe {
        /// Project to stop following.
        project_id: ProjectId,
    },
    /// Create a task.
    CreateTask(TaskDraft),
    /// Update fields of a task.
    UpdateTask {
        /// Task to update.
        task_id: TaskId,
        /// Fields to change.
        patch: TaskPatch,
    },
    /// Delete a task.
    DeleteTask {
        /// Task to delete.
        task_id: TaskId,
    },
    /// List all tasks of a project.
    ListTasks {
        /// Project to list.
        project_id: ProjectId,
    },
    /// List the members of a project.
    ListMembers {
        /// Project to list.
        project_id: ProjectId,
    },
    /// Create a project owned by the caller.
    CreateProject {
        /// Project name.
        name: String,
    },
    /// Add a registered user to a project by email (owner only).
    InviteMember {
        /// Target project.
        project_id: ProjectId,
        /// Email of the user to add.
        email: String,
    },
    /// Delete a project and all its tasks (owner only).
    DeleteProject {
        /// Project to delete.
        project_id: ProjectId,
    },
    /// List the projects the caller owns or belongs to.
    ListProjects,
    /// Rename a project (owner only).
    RenameProject {
        /// Project to rename.
        project_id: ProjectId,
        /// New name.
        name: String,
    },
    /// Find registered users whose email contains `query`.
    SearchUsers {
        /// Case-insensitive email fragment.
        query: String,
    },
}

/// Successful results, one variant per [`RequestBody`] family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    /// Subscription change applied.
    Subscribed,
    /// Subscription removed.
    Unsubscribed,
    /// A single task (create or update).
    Task(TaskRecord),
    /// A task was deleted.
    Deleted,
    /// All tasks of a project.
    Tasks(Vec<TaskRecord>),
    /// All members of a project.
    Members(Vec<Member>),
    /// A project was created.
    ProjectCreated {
        /// Id of the new project.
        project_id: ProjectId,
    },
    /// A member was added (or already present).
    MemberAdded(Member),
    /// A project was deleted.
    ProjectDeleted,
    /// Projects visible to the caller.
    Projects(Vec<ProjectSummary>),
    /// A project after a rename.
    ProjectRenamed(ProjectSummary),
    /// Users matching a search.
    Users(Vec<Member>),
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// First message on every connection.
    Identify {
        /// The caller's user id.
        user_id: UserId,
        /// The caller's email, used for invitations.
        email: String,
    },
    /// An authoritative request.
    Request {
        /// Echoed back in the response.
        request_id: RequestId,
        /// The operation.
        body: RequestBody,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Acknowledges [`ClientMessage::Identify`].
    Identified {
        /// The identified user id.
        user_id: UserId,
    },
    /// Result of a request.
    Response {
        /// Id of the request being answered.
        request_id: RequestId,
        /// Outcome.
        result: Result<ResponseBody, GatewayError>,
    },
    /// A live update on a subscribed project channel.
    Event(LiveUpdateEvent),
    /// A connection-level error not tied to a request.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}
