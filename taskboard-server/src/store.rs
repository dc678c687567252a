//! In-memory authoritative task store.
//!
//! The [`TaskStore`] holds users, projects, and tasks and performs the
//! authorization checks of the persistence gateway: every task operation
//! requires the caller to be the project owner or a member. Concurrent
//! writers are not coordinated beyond the lock; the last write wins.
//!
//! State is ephemeral and lost on restart.

use std::collections::{BTreeMap, HashMap};

use taskboard_proto::task::{
    Member, ProjectId, ProjectSummary, Task, TaskDraft, TaskId, TaskPatch, TaskStatus, UserId,
    ValidationError,
};
use taskboard_proto::wire::GatewayError;
use tokio::sync::RwLock;

/// Errors returned by store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Caller lacks the required project role.
    #[error("unauthorized")]
    Unauthorized,
    /// The project does not exist.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),
    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// No registered user has this email.
    #[error("user not found: {0}")]
    UserNotFound(String),
    /// Task input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Assignee is not a member of the project.
    #[error("assignee {0} is not a project member")]
    InvalidAssignee(UserId),
    /// Project name is empty.
    #[error("project name cannot be empty")]
    EmptyProjectName,
    /// User search query is empty.
    #[error("search query cannot be empty")]
    EmptySearchQuery,
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unauthorized => Self::Unauthorized,
            StoreError::ProjectNotFound(_)
            | StoreError::TaskNotFound(_)
            | StoreError::UserNotFound(_) => Self::NotFound(err.to_string()),
            StoreError::Validation(_)
            | StoreError::InvalidAssignee(_)
            | StoreError::EmptyProjectName
            | StoreError::EmptySearchQuery => Self::ValidationFailed(err.to_string()),
        }
    }
}

/// A project and its membership.
#[derive(Debug, Clone)]
pub struct Project {
    /// Unique project identifier.
    pub id: ProjectId,
    /// Human-readable project name.
    pub name: String,
    /// The creating user; always a member.
    pub owner: UserId,
    /// Members in join order, owner first.
    pub members: Vec<UserId>,
}

impl Project {
    fn has_member(&self, user: UserId) -> bool {
        self.owner == user || self.members.contains(&user)
    }

    fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            project_id: self.id,
            name: self.name.clone(),
            owner: self.owner,
            member_count: self.members.len(),
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    /// User id -> normalized email.
    users: HashMap<UserId, String>,
    projects: HashMap<ProjectId, Project>,
    /// Keyed by UUID v7 ids, so iteration follows creation order.
    tasks: BTreeMap<TaskId, Task>,
}

impl StoreInner {
    fn project_for_member(&self, project_id: ProjectId, user: UserId) -> Result<&Project, StoreError> {
        let project = self
            .projects
            .get(&project_id)
            .ok_or(StoreError::ProjectNotFound(project_id))?;
        if !project.has_member(user) {
            return Err(StoreError::Unauthorized);
        }
        Ok(project)
    }

    fn project_for_owner(&self, project_id: ProjectId, user: UserId) -> Result<&Project, StoreError> {
        let project = self
            .projects
            .get(&project_id)
            .ok_or(StoreError::ProjectNotFound(project_id))?;
        if project.owner != user {
            return Err(StoreError::Unauthorized);
        }
        Ok(project)
    }

    fn check_assignee(project: &Project, assignee: Option<UserId>) -> Result<(), StoreError> {
        match assignee {
            Some(user) if !project.has_member(user) => Err(StoreError::InvalidAssignee(user)),
            _ => Ok(()),
        }
    }

    fn member(&self, user_id: UserId) -> Member {
        Member {
            user_id,
            email: self.users.get(&user_id).cloned().unwrap_or_default(),
        }
    }
}

/// Thread-safe in-memory store of users, projects, and tasks.
pub struct TaskStore {
    inner: RwLock<StoreInner>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Registers (or re-registers) a user with their email.
    ///
    /// Emails are normalized to lowercase so invitations match regardless of
    /// case.
    pub async fn register_user(&self, user_id: UserId, email: &str) {
        let mut inner = self.inner.write().await;
        inner.users.insert(user_id, email.trim().to_lowercase());
    }

    /// Creates a project owned by `owner`, who becomes its first member.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyProjectName`] for a blank name.
    pub async fn create_project(&self, owner: UserId, name: &str) -> Result<ProjectId, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyProjectName);
        }
        let project = Project {
            id: ProjectId::new(),
            name: name.to_string(),
            owner,
            members: vec![owner],
        };
        let id = project.id;
        self.inner.write().await.projects.insert(id, project);
        Ok(id)
    }

    /// Adds the user registered under `email` to a project.
    ///
    /// Inviting an existing member is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectNotFound`], [`StoreError::Unauthorized`]
    /// if `by` is not the owner, or [`StoreError::UserNotFound`].
    pub async fn invite_member(
        &self,
        project_id: ProjectId,
        by: UserId,
        email: &str,
    ) -> Result<Member, StoreError> {
        let mut inner = self.inner.write().await;
        inner.project_for_owner(project_id, by)?;

        let normalized = email.trim().to_lowercase();
        let user_id = inner
            .users
            .iter()
            .find_map(|(id, e)| (*e == normalized).then_some(*id))
            .ok_or_else(|| StoreError::UserNotFound(normalized.clone()))?;

        if let Some(project) = inner.projects.get_mut(&project_id)
            && !project.members.contains(&user_id)
        {
            project.members.push(user_id);
        }
        Ok(Member {
            user_id,
            email: normalized,
        })
    }

    /// Deletes a project and cascades to its tasks, returning the number of
    /// tasks removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectNotFound`] or [`StoreError::Unauthorized`]
    /// if `by` is not the owner.
    pub async fn delete_project(&self, project_id: ProjectId, by: UserId) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        inner.project_for_owner(project_id, by)?;
        inner.projects.remove(&project_id);
        let before = inner.tasks.len();
        inner.tasks.retain(|_, task| task.project_id != project_id);
        Ok(before - inner.tasks.len())
    }

    /// Renames a project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyProjectName`] for a blank name,
    /// [`StoreError::ProjectNotFound`], or [`StoreError::Unauthorized`] if
    /// `by` is not the owner.
    pub async fn rename_project(
        &self,
        project_id: ProjectId,
        by: UserId,
        name: &str,
    ) -> Result<ProjectSummary, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyProjectName);
        }
        let mut inner = self.inner.write().await;
        inner.project_for_owner(project_id, by)?;
        let project = inner
            .projects
            .get_mut(&project_id)
            .ok_or(StoreError::ProjectNotFound(project_id))?;
        project.name = name.to_string();
        Ok(project.summary())
    }

    /// Lists the projects `user` owns or belongs to, oldest first.
    pub async fn list_projects(&self, user: UserId) -> Vec<ProjectSummary> {
        let inner = self.inner.read().await;
        let mut projects: Vec<ProjectSummary> = inner
            .projects
            .values()
            .filter(|project| project.has_member(user))
            .map(Project::summary)
            .collect();
        projects.sort_by_key(|p| p.project_id);
        projects
    }

    /// Finds registered users whose email contains `query`, ignoring case.
    ///
    /// Results are ordered by email.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptySearchQuery`] for a blank query.
    pub async fn search_users(&self, query: &str) -> Result<Vec<Member>, StoreError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(StoreError::EmptySearchQuery);
        }
        let inner = self.inner.read().await;
        let mut found: Vec<Member> = inner
            .users
            .iter()
            .filter(|(_, email)| email.contains(&needle))
            .map(|(user_id, email)| Member {
                user_id: *user_id,
                email: email.clone(),
            })
            .collect();
        found.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(found)
    }

    /// Checks that `user` may access the project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectNotFound`] or [`StoreError::Unauthorized`].
    pub async fn authorize(&self, project_id: ProjectId, user: UserId) -> Result<(), StoreError> {
        let inner = self.inner.read().await;
        inner.project_for_member(project_id, user).map(|_| ())
    }

    /// Lists the members of a project, owner first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectNotFound`] or [`StoreError::Unauthorized`].
    pub async fn list_members(
        &self,
        project_id: ProjectId,
        by: UserId,
    ) -> Result<Vec<Member>, StoreError> {
        let inner = self.inner.read().await;
        let project = inner.project_for_member(project_id, by)?;
        Ok(project.members.iter().map(|id| inner.member(*id)).collect())
    }

    /// Creates a task from a draft.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectNotFound`], [`StoreError::Unauthorized`],
    /// [`StoreError::Validation`], or [`StoreError::InvalidAssignee`].
    pub async fn create_task(&self, by: UserId, draft: TaskDraft) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        let project = inner.project_for_member(draft.project_id, by)?;
        let draft = draft.validated()?;
        StoreInner::check_assignee(project, draft.assignee)?;

        let task = Task {
            id: TaskId::new(),
            project_id: draft.project_id,
            title: draft.title,
            description: draft.description,
            status: draft.status.unwrap_or(TaskStatus::Todo),
            assignee: draft.assignee,
        };
        inner.tasks.insert(task.id, task.clone());
        drop(inner);
        Ok(task)
    }

    /// Applies a patch to a task and returns the updated task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`], [`StoreError::Unauthorized`],
    /// [`StoreError::Validation`], or [`StoreError::InvalidAssignee`].
    pub async fn update_task(
        &self,
        by: UserId,
        task_id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        let project_id = inner
            .tasks
            .get(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?
            .project_id;
        let project = inner.project_for_member(project_id, by)?;
        let patch = patch.validated()?;
        if let Some(assignee) = patch.assignee {
            StoreInner::check_assignee(project, assignee)?;
        }

        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;
        patch.apply_to(task);
        Ok(task.clone())
    }

    /// Deletes a task and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] or [`StoreError::Unauthorized`].
    pub async fn delete_task(&self, by: UserId, task_id: TaskId) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        let project_id = inner
            .tasks
            .get(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?
            .project_id;
        inner.project_for_member(project_id, by)?;
        inner
            .tasks
            .remove(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))
    }

    /// Lists the tasks of a project in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectNotFound`] or [`StoreError::Unauthorized`].
    pub async fn list_tasks(&self, by: UserId, project_id: ProjectId) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.read().await;
        inner.project_for_member(project_id, by)?;
        Ok(inner
            .tasks
            .values()
            .filter(|task| task.project_id == project_id)
            .cloned()
            .collect())
    }
}
