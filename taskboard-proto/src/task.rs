//! Task model shared by the taskboard client and server.
//!
//! A [`Task`] is the typed, validated form used by the board engine and the
//! store. A [`TaskRecord`] is the wire shape, carrying the status as its
//! string key so that a peer running a newer status set cannot make the
//! whole message undecodable; records are converted with [`Task::try_from`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 100;

/// Maximum allowed task description length in characters.
pub const MAX_TASK_DESCRIPTION_LENGTH: usize = 500;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new time-ordered identifier (UUID v7).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID value.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a task.
    TaskId
);
uuid_id!(
    /// Unique identifier for a project.
    ProjectId
);
uuid_id!(
    /// Unique identifier for a user.
    UserId
);

/// Errors produced when validating task input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Task title is empty after trimming.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds [`MAX_TASK_TITLE_LENGTH`].
    #[error("task title too long (max {MAX_TASK_TITLE_LENGTH} characters)")]
    TitleTooLong,
    /// Task description exceeds [`MAX_TASK_DESCRIPTION_LENGTH`].
    #[error("task description too long (max {MAX_TASK_DESCRIPTION_LENGTH} characters)")]
    DescriptionTooLong,
    /// Status key is not one of `todo`, `in_progress`, `done`.
    #[error("unknown task status: {0}")]
    UnknownStatus(String),
}

/// Status column of a task.
///
/// The three states are fully connected: any status may move directly to
/// any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    Todo,
    /// Actively being worked on.
    InProgress,
    /// Completed.
    Done,
}

impl TaskStatus {
    /// All statuses in board column order.
    pub const ALL: [Self; 3] = [Self::Todo, Self::InProgress, Self::Done];

    /// Returns the wire/column key for this status.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Returns the column index of this status (`0..3`).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Todo => 0,
            Self::InProgress => 1,
            Self::Done => 2,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// A task as held by the store and the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Owning project. Immutable after creation.
    pub project_id: ProjectId,
    /// Non-empty title, at most [`MAX_TASK_TITLE_LENGTH`] characters.
    pub title: String,
    /// Optional description, at most [`MAX_TASK_DESCRIPTION_LENGTH`] characters.
    pub description: Option<String>,
    /// Current status column.
    pub status: TaskStatus,
    /// Optional assignee, a member of the owning project.
    pub assignee: Option<UserId>,
}

/// Wire representation of a [`Task`] with the status as a string key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task identifier.
    pub id: TaskId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Task title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Status key (`todo`, `in_progress`, `done`).
    pub status: String,
    /// Optional assignee.
    pub assignee: Option<UserId>,
}

impl From<Task> for TaskRecord {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            project_id: task.project_id,
            title: task.title,
            description: task.description,
            status: task.status.key().to_string(),
            assignee: task.assignee,
        }
    }
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self::from(task.clone())
    }
}

impl TryFrom<TaskRecord> for Task {
    type Error = ValidationError;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        let status = record.status.parse()?;
        Ok(Self {
            id: record.id,
            project_id: record.project_id,
            title: record.title,
            description: record.description,
            status,
            assignee: record.assignee,
        })
    }
}

/// A member of a project, used to populate assignee selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The member's user id.
    pub user_id: UserId,
    /// The member's email address.
    pub email: String,
}

/// A project as listed for one of its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    /// The project id.
    pub project_id: ProjectId,
    /// Display name.
    pub name: String,
    /// The owning user.
    pub owner: UserId,
    /// Number of members, the owner included.
    pub member_count: usize,
}

/// Input for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Project the task will belong to.
    pub project_id: ProjectId,
    /// Task title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Initial status; `todo` when absent.
    pub status: Option<TaskStatus>,
    /// Optional assignee.
    pub assignee: Option<UserId>,
}

impl TaskDraft {
    /// Creates a draft with only a title; all optional fields are empty.
    pub fn new(project_id: ProjectId, title: impl Into<String>) -> Self {
        Self {
            project_id,
            title: title.into(),
            description: None,
            status: None,
            assignee: None,
        }
    }

    /// Trims the title and checks all field limits.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an empty or overlong title, or an
    /// overlong description.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.title = validate_title(&self.title)?;
        self.description = validate_description(self.description)?;
        Ok(self)
    }
}

/// Partial update of a task. `None` leaves a field untouched.
///
/// Nullable fields use a nested option: `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description, or `Some(None)` to clear it.
    pub description: Option<Option<String>>,
    /// New status.
    pub status: Option<TaskStatus>,
    /// New assignee, or `Some(None)` to unassign.
    pub assignee: Option<Option<UserId>>,
}

impl TaskPatch {
    /// A patch that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.assignee.is_none()
    }

    /// Trims the title (if present) and checks all field limits.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an empty or overlong title, or an
    /// overlong description.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        if let Some(title) = self.title.take() {
            self.title = Some(validate_title(&title)?);
        }
        if let Some(description) = self.description.take() {
            self.description = Some(validate_description(description)?);
        }
        Ok(self)
    }

    /// Applies the patch to a task in place.
    pub fn apply_to(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(assignee) = self.assignee {
            task.assignee = assignee;
        }
    }
}

fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    if trimmed.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong);
    }
    Ok(trimmed.to_string())
}

fn validate_description(description: Option<String>) -> Result<Option<String>, ValidationError> {
    let Some(description) = description else {
        return Ok(None);
    };
    let trimmed = description.trim();
    if trimmed.chars().count() > MAX_TASK_DESCRIPTION_LENGTH {
        return Err(ValidationError::DescriptionTooLong);
    }
    Ok(Some(trimmed.to_string()))
}
