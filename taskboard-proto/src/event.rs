//! Live update events broadcast on per-project channels.
//!
//! Events are fire-and-forget: they are never persisted, never acknowledged,
//! and may reach a subscriber zero or more times. Receivers must merge them
//! idempotently.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::task::{ProjectId, TaskId, TaskRecord};

/// Name of the live update channel for one project (`project:<id>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectChannel(ProjectId);

impl ProjectChannel {
    /// Returns the channel for the given project.
    #[must_use]
    pub const fn new(project_id: ProjectId) -> Self {
        Self(project_id)
    }

    /// Returns the project this channel belongs to.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.0
    }
}

impl fmt::Display for ProjectChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project:{}", self.0)
    }
}

/// Discriminant of a [`LiveUpdate`], used to register handlers by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A task was created.
    TaskCreated,
    /// A task was updated (any field, including status).
    TaskUpdated,
    /// A task was deleted.
    TaskDeleted,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [Self; 3] = [Self::TaskCreated, Self::TaskUpdated, Self::TaskDeleted];

    /// Wire name of the event kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TaskCreated => "taskCreated",
            Self::TaskUpdated => "taskUpdated",
            Self::TaskDeleted => "taskDeleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of a live update event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveUpdate {
    /// Full record of a newly created task.
    TaskCreated(TaskRecord),
    /// Full record of a task after an update.
    TaskUpdated(TaskRecord),
    /// Id of a deleted task.
    TaskDeleted(TaskId),
}

impl LiveUpdate {
    /// Returns the kind of this update.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::TaskCreated(_) => EventKind::TaskCreated,
            Self::TaskUpdated(_) => EventKind::TaskUpdated,
            Self::TaskDeleted(_) => EventKind::TaskDeleted,
        }
    }

    /// Returns the id of the task the update concerns.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        match self {
            Self::TaskCreated(record) | Self::TaskUpdated(record) => record.id,
            Self::TaskDeleted(id) => *id,
        }
    }
}

/// A live update scoped to one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveUpdateEvent {
    /// Project whose channel carries this event.
    pub project_id: ProjectId,
    /// What happened.
    pub update: LiveUpdate,
}

impl LiveUpdateEvent {
    /// Creates an event for the given project.
    #[must_use]
    pub const fn new(project_id: ProjectId, update: LiveUpdate) -> Self {
        Self { project_id, update }
    }

    /// Returns the kind of the carried update.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.update.kind()
    }

    /// Returns the channel this event is published on.
    #[must_use]
    pub const fn channel(&self) -> ProjectChannel {
        ProjectChannel::new(self.project_id)
    }
}
