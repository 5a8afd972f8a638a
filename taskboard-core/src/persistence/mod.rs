//! Persistence collaborator contract
//!
//! The board engine never talks to a database directly. It consumes this
//! trait, which mirrors a generic relational row API: list, insert, update,
//! delete and upsert. Implementations decide how rows are stored; the engine
//! only relies on the shapes defined here.
//!
//! Deleted tasks are soft-deleted: `delete_task` flags the row and every
//! `list_tasks` call must leave flagged rows out.

mod memory;

pub use memory::{MemoryPersistence, PersistenceOp};

use crate::error::{BoardError, PersistenceError, Result};
use crate::types::{
    Column, ColumnId, Priority, Project, ProjectId, ProjectPatch, Task, TaskId, TaskPatch,
    TaskStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Result type for collaborator calls
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// Stored project row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored column row. Also the payload of a column order upsert, which
/// carries every required field and not just the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub id: ColumnId,
    pub project_id: ProjectId,
    pub title: String,
    pub status: TaskStatus,
    pub color: String,
    pub order: usize,
}

impl ColumnRecord {
    /// Build the row for a column of `project_id`
    pub fn from_column(project_id: &ProjectId, column: &Column) -> Self {
        Self {
            id: column.id.clone(),
            project_id: project_id.clone(),
            title: column.title.clone(),
            status: column.status.clone(),
            color: column.color.clone(),
            order: column.order,
        }
    }
}

/// Stored task row (soft-deleted rows never appear)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub column_id: ColumnId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub position: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn into_task(self) -> Task {
        Task {
            id: self.id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            assignee: self.assignee,
            attachments: self.attachments,
            created_at: self.created_at,
            updated_at: self.updated_at,
            position: self.position,
        }
    }
}

/// Insert payload for a project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
}

/// Insert payload for a column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewColumn {
    pub project_id: ProjectId,
    pub title: String,
    pub status: TaskStatus,
    pub color: String,
    pub order: usize,
}

/// Insert payload for a task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    pub project_id: ProjectId,
    pub column_id: ColumnId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub attachments: Vec<String>,
    pub position: usize,
    pub created_by: Option<String>,
}

/// Field mask for a task row update
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<Priority>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl TaskChanges {
    /// A position-only update
    pub fn position(position: usize) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }
}

impl From<&TaskPatch> for TaskChanges {
    fn from(patch: &TaskPatch) -> Self {
        Self {
            title: patch.title.clone(),
            description: patch.description.clone(),
            priority: patch.priority,
            assignee: patch.assignee.clone(),
            attachments: patch.attachments.clone(),
            position: None,
        }
    }
}

/// Durable storage for projects, columns and tasks.
///
/// Every call may fail with a [`PersistenceError`]; callers treat all
/// failures alike.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// All projects
    async fn list_projects(&self) -> PersistenceResult<Vec<ProjectRecord>>;

    /// Columns ordered by their `order` field, optionally for one project
    async fn list_columns(
        &self,
        project_id: Option<&ProjectId>,
    ) -> PersistenceResult<Vec<ColumnRecord>>;

    /// Live (not soft-deleted) tasks, optionally for one column
    async fn list_tasks(&self, column_id: Option<&ColumnId>) -> PersistenceResult<Vec<TaskRecord>>;

    async fn insert_project(&self, project: NewProject) -> PersistenceResult<ProjectRecord>;

    async fn update_project(
        &self,
        id: &ProjectId,
        patch: &ProjectPatch,
    ) -> PersistenceResult<ProjectRecord>;

    /// Delete a project together with its columns and tasks
    async fn delete_project(&self, id: &ProjectId) -> PersistenceResult<()>;

    async fn insert_column(&self, column: NewColumn) -> PersistenceResult<ColumnRecord>;

    /// Delete a column together with its tasks
    async fn delete_column(&self, id: &ColumnId) -> PersistenceResult<()>;

    /// Write full column rows, inserting or replacing by id
    async fn upsert_column_order(&self, rows: &[ColumnRecord]) -> PersistenceResult<()>;

    async fn insert_task(&self, task: NewTask) -> PersistenceResult<TaskRecord>;

    async fn update_task(&self, id: &TaskId, changes: &TaskChanges)
        -> PersistenceResult<TaskRecord>;

    /// Soft-delete a task
    async fn delete_task(&self, id: &TaskId) -> PersistenceResult<()>;

    async fn update_task_column_and_status(
        &self,
        id: &TaskId,
        column_id: &ColumnId,
        status: &TaskStatus,
    ) -> PersistenceResult<()>;
}

// =============================================================================
// Snapshot assembly
// =============================================================================

/// Load one project with its columns and tasks
pub async fn load_project(persistence: &dyn Persistence, id: &ProjectId) -> Result<Project> {
    let projects = persistence
        .list_projects()
        .await
        .map_err(|e| BoardError::persistence("load projects", e))?;
    let record = projects
        .into_iter()
        .find(|p| &p.id == id)
        .ok_or_else(|| BoardError::ProjectNotFound { id: id.to_string() })?;

    let columns = persistence
        .list_columns(Some(id))
        .await
        .map_err(|e| BoardError::persistence("load columns", e))?;
    let tasks = persistence
        .list_tasks(None)
        .await
        .map_err(|e| BoardError::persistence("load tasks", e))?;

    let project = assemble(record, columns, tasks);
    info!(
        project = %project.id,
        columns = project.columns.len(),
        tasks = project.task_count(),
        "Loaded project board"
    );
    Ok(project)
}

/// Load every project, newest first
pub async fn load_projects(persistence: &dyn Persistence) -> Result<Vec<Project>> {
    let mut records = persistence
        .list_projects()
        .await
        .map_err(|e| BoardError::persistence("load projects", e))?;
    let columns = persistence
        .list_columns(None)
        .await
        .map_err(|e| BoardError::persistence("load columns", e))?;
    let tasks = persistence
        .list_tasks(None)
        .await
        .map_err(|e| BoardError::persistence("load tasks", e))?;

    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut columns_by_project: HashMap<ProjectId, Vec<ColumnRecord>> = HashMap::new();
    for column in columns {
        columns_by_project
            .entry(column.project_id.clone())
            .or_default()
            .push(column);
    }

    let projects: Vec<Project> = records
        .into_iter()
        .map(|record| {
            let columns = columns_by_project.remove(&record.id).unwrap_or_default();
            assemble(record, columns, tasks.clone())
        })
        .collect();
    debug!(count = projects.len(), "Loaded projects");
    Ok(projects)
}

/// Compose rows into a project snapshot. Columns follow their `order`, tasks
/// follow `position` with creation time breaking ties; rows pointing at
/// columns of other projects are ignored.
fn assemble(record: ProjectRecord, mut columns: Vec<ColumnRecord>, tasks: Vec<TaskRecord>) -> Project {
    columns.retain(|c| c.project_id == record.id);
    columns.sort_by_key(|c| c.order);

    let mut tasks_by_column: HashMap<ColumnId, Vec<TaskRecord>> = HashMap::new();
    for task in tasks {
        if task.project_id == record.id {
            tasks_by_column
                .entry(task.column_id.clone())
                .or_default()
                .push(task);
        }
    }

    let columns = columns
        .into_iter()
        .map(|c| {
            let mut rows = tasks_by_column.remove(&c.id).unwrap_or_default();
            rows.sort_by(|a, b| {
                a.position
                    .cmp(&b.position)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            });
            Column {
                id: c.id,
                title: c.title,
                status: c.status,
                color: c.color,
                order: c.order,
                tasks: rows.into_iter().map(TaskRecord::into_task).collect(),
            }
        })
        .collect();

    Project {
        id: record.id,
        name: record.name,
        description: record.description,
        created_at: record.created_at,
        updated_at: record.updated_at,
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_row(id: &str, column: &str, position: usize) -> TaskRecord {
        let now = Utc::now();
        TaskRecord {
            id: id.into(),
            project_id: "p".into(),
            column_id: column.into(),
            title: id.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: None,
            assignee: None,
            attachments: Vec::new(),
            position,
            created_at: now,
            updated_at: now,
        }
    }

    fn column_row(id: &str, project: &str, order: usize) -> ColumnRecord {
        ColumnRecord {
            id: id.into(),
            project_id: project.into(),
            title: id.into(),
            status: TaskStatus::Todo,
            color: "c".into(),
            order,
        }
    }

    #[test]
    fn test_assemble_orders_columns_and_tasks() {
        let now = Utc::now();
        let record = ProjectRecord {
            id: "p".into(),
            name: "P".into(),
            description: None,
            owner_id: None,
            created_at: now,
            updated_at: now,
        };
        let columns = vec![
            column_row("second", "p", 1),
            column_row("first", "p", 0),
            column_row("elsewhere", "other", 0),
        ];
        let tasks = vec![
            task_row("b", "first", 1),
            task_row("a", "first", 0),
            task_row("c", "second", 0),
        ];

        let project = assemble(record, columns, tasks);
        let column_ids: Vec<_> = project.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(column_ids, vec!["first", "second"]);
        let task_ids: Vec<_> = project.columns[0].tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(task_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_changes_from_patch_never_carry_position() {
        let patch = TaskPatch::new().with_title("x");
        let changes = TaskChanges::from(&patch);
        assert_eq!(changes.title.as_deref(), Some("x"));
        assert!(changes.position.is_none());

        let json = serde_json::to_value(TaskChanges::position(3)).unwrap();
        assert_eq!(json, serde_json::json!({"position": 3}));
    }
}
