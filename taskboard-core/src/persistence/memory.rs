//! In-process persistence backend
//!
//! Keeps rows in memory behind a tokio mutex. Failures can be injected per
//! operation (and optionally per row id) so callers can exercise their
//! rollback paths; every write is recorded for inspection.

use super::{
    ColumnRecord, NewColumn, NewProject, NewTask, Persistence, PersistenceResult, ProjectRecord,
    TaskChanges, TaskRecord,
};
use crate::error::PersistenceError;
use crate::types::{ColumnId, Project, ProjectId, ProjectPatch, TaskId, TaskStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use tokio::sync::Mutex;
use tracing::trace;
use ulid::Ulid;

/// Names a collaborator call, for failure injection and the write log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceOp {
    ListProjects,
    ListColumns,
    ListTasks,
    InsertProject,
    UpdateProject,
    DeleteProject,
    InsertColumn,
    DeleteColumn,
    UpsertColumnOrder,
    InsertTask,
    UpdateTask,
    DeleteTask,
    UpdateTaskColumnAndStatus,
}

impl PersistenceOp {
    pub fn is_write(self) -> bool {
        !matches!(self, Self::ListProjects | Self::ListColumns | Self::ListTasks)
    }
}

impl fmt::Display for PersistenceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListProjects => "list projects",
            Self::ListColumns => "list columns",
            Self::ListTasks => "list tasks",
            Self::InsertProject => "insert project",
            Self::UpdateProject => "update project",
            Self::DeleteProject => "delete project",
            Self::InsertColumn => "insert column",
            Self::DeleteColumn => "delete column",
            Self::UpsertColumnOrder => "upsert column order",
            Self::InsertTask => "insert task",
            Self::UpdateTask => "update task",
            Self::DeleteTask => "delete task",
            Self::UpdateTaskColumnAndStatus => "update task column and status",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct FailRule {
    op: PersistenceOp,
    target: Option<String>,
    /// `None` fails forever
    remaining: Option<usize>,
    error: PersistenceError,
}

#[derive(Debug, Clone)]
struct StoredTask {
    record: TaskRecord,
    deleted: bool,
}

#[derive(Debug, Default)]
struct State {
    projects: Vec<ProjectRecord>,
    columns: Vec<ColumnRecord>,
    tasks: Vec<StoredTask>,
    failures: Vec<FailRule>,
    writes: Vec<(PersistenceOp, Option<String>)>,
}

impl State {
    /// Apply failure rules, then record the call if it is a write
    fn enter(&mut self, op: PersistenceOp, target: Option<&str>) -> PersistenceResult<()> {
        trace!(%op, target = ?target, "Persistence call");
        let hit = self.failures.iter().position(|rule| {
            rule.op == op && (rule.target.is_none() || rule.target.as_deref() == target)
        });
        if let Some(i) = hit {
            let error = self.failures[i].error.clone();
            if let Some(remaining) = self.failures[i].remaining.as_mut() {
                *remaining -= 1;
                if *remaining == 0 {
                    self.failures.remove(i);
                }
            }
            return Err(error);
        }
        if op.is_write() {
            self.writes.push((op, target.map(str::to_string)));
        }
        Ok(())
    }

    fn seed(&mut self, project: &Project) {
        self.projects.push(ProjectRecord {
            id: project.id.clone(),
            name: project.name.clone(),
            description: project.description.clone(),
            owner_id: None,
            created_at: project.created_at,
            updated_at: project.updated_at,
        });
        for column in &project.columns {
            self.columns
                .push(ColumnRecord::from_column(&project.id, column));
            for task in &column.tasks {
                self.tasks.push(StoredTask {
                    record: TaskRecord {
                        id: task.id.clone(),
                        project_id: project.id.clone(),
                        column_id: column.id.clone(),
                        title: task.title.clone(),
                        description: task.description.clone(),
                        status: task.status.clone(),
                        priority: task.priority,
                        assignee: task.assignee.clone(),
                        attachments: task.attachments.clone(),
                        position: task.position,
                        created_at: task.created_at,
                        updated_at: task.updated_at,
                    },
                    deleted: false,
                });
            }
        }
    }

    fn live_task_mut(&mut self, id: &TaskId) -> PersistenceResult<&mut TaskRecord> {
        self.tasks
            .iter_mut()
            .find(|t| &t.record.id == id && !t.deleted)
            .map(|t| &mut t.record)
            .ok_or_else(|| PersistenceError::not_found(format!("task {}", id)))
    }
}

/// Memory-backed [`Persistence`] implementation
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    state: Mutex<State>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the rows of an existing project snapshot
    pub fn with_project(project: &Project) -> Self {
        let mut state = State::default();
        state.seed(project);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Add the rows of a project snapshot
    pub async fn seed(&self, project: &Project) {
        self.state.lock().await.seed(project);
    }

    /// Fail every call to `op` (optionally only for row `target`) until cleared
    pub async fn fail_on(&self, op: PersistenceOp, target: Option<&str>) {
        self.push_rule(op, target, None).await;
    }

    /// Fail the next call to `op` (optionally only for row `target`)
    pub async fn fail_once(&self, op: PersistenceOp, target: Option<&str>) {
        self.push_rule(op, target, Some(1)).await;
    }

    async fn push_rule(&self, op: PersistenceOp, target: Option<&str>, remaining: Option<usize>) {
        let error = PersistenceError::unavailable(format!("injected failure on {}", op));
        self.state.lock().await.failures.push(FailRule {
            op,
            target: target.map(str::to_string),
            remaining,
            error,
        });
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    /// Successful writes so far, oldest first
    pub async fn writes(&self) -> Vec<(PersistenceOp, Option<String>)> {
        self.state.lock().await.writes.clone()
    }

    pub async fn clear_writes(&self) {
        self.state.lock().await.writes.clear();
    }

    /// Raw task row, including soft-deleted ones, with its deleted flag
    pub async fn task_row(&self, id: &TaskId) -> Option<(TaskRecord, bool)> {
        self.state
            .lock()
            .await
            .tasks
            .iter()
            .find(|t| &t.record.id == id)
            .map(|t| (t.record.clone(), t.deleted))
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn list_projects(&self) -> PersistenceResult<Vec<ProjectRecord>> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::ListProjects, None)?;
        Ok(state.projects.clone())
    }

    async fn list_columns(
        &self,
        project_id: Option<&ProjectId>,
    ) -> PersistenceResult<Vec<ColumnRecord>> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::ListColumns, project_id.map(|p| p.as_str()))?;
        let mut columns: Vec<ColumnRecord> = state
            .columns
            .iter()
            .filter(|c| project_id.map_or(true, |p| &c.project_id == p))
            .cloned()
            .collect();
        columns.sort_by_key(|c| c.order);
        Ok(columns)
    }

    async fn list_tasks(&self, column_id: Option<&ColumnId>) -> PersistenceResult<Vec<TaskRecord>> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::ListTasks, column_id.map(|c| c.as_str()))?;
        Ok(state
            .tasks
            .iter()
            .filter(|t| !t.deleted)
            .filter(|t| column_id.map_or(true, |c| &t.record.column_id == c))
            .map(|t| t.record.clone())
            .collect())
    }

    async fn insert_project(&self, project: NewProject) -> PersistenceResult<ProjectRecord> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::InsertProject, None)?;
        let now = Utc::now();
        let record = ProjectRecord {
            id: ProjectId::from_string(Ulid::new().to_string()),
            name: project.name,
            description: project.description,
            owner_id: Some(project.owner_id),
            created_at: now,
            updated_at: now,
        };
        state.projects.push(record.clone());
        Ok(record)
    }

    async fn update_project(
        &self,
        id: &ProjectId,
        patch: &ProjectPatch,
    ) -> PersistenceResult<ProjectRecord> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::UpdateProject, Some(id.as_str()))?;
        let record = state
            .projects
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| PersistenceError::not_found(format!("project {}", id)))?;
        if let Some(name) = &patch.name {
            record.name = name.clone();
        }
        if let Some(description) = &patch.description {
            record.description = description.clone();
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete_project(&self, id: &ProjectId) -> PersistenceResult<()> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::DeleteProject, Some(id.as_str()))?;
        state.projects.retain(|p| &p.id != id);
        state.columns.retain(|c| &c.project_id != id);
        state.tasks.retain(|t| &t.record.project_id != id);
        Ok(())
    }

    async fn insert_column(&self, column: NewColumn) -> PersistenceResult<ColumnRecord> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::InsertColumn, None)?;
        let record = ColumnRecord {
            id: ColumnId::from_string(Ulid::new().to_string()),
            project_id: column.project_id,
            title: column.title,
            status: column.status,
            color: column.color,
            order: column.order,
        };
        state.columns.push(record.clone());
        Ok(record)
    }

    async fn delete_column(&self, id: &ColumnId) -> PersistenceResult<()> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::DeleteColumn, Some(id.as_str()))?;
        state.columns.retain(|c| &c.id != id);
        state.tasks.retain(|t| &t.record.column_id != id);
        Ok(())
    }

    async fn upsert_column_order(&self, rows: &[ColumnRecord]) -> PersistenceResult<()> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::UpsertColumnOrder, None)?;
        for row in rows {
            match state.columns.iter_mut().find(|c| c.id == row.id) {
                Some(existing) => *existing = row.clone(),
                None => state.columns.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn insert_task(&self, task: NewTask) -> PersistenceResult<TaskRecord> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::InsertTask, None)?;
        if !state.columns.iter().any(|c| c.id == task.column_id) {
            return Err(PersistenceError::not_found(format!("column {}", task.column_id)));
        }
        let now = Utc::now();
        let record = TaskRecord {
            id: TaskId::from_string(Ulid::new().to_string()),
            project_id: task.project_id,
            column_id: task.column_id,
            title: task.title,
            description: task.description,
            status: task.status,
            priority: Some(task.priority),
            assignee: task.assignee,
            attachments: task.attachments,
            position: task.position,
            created_at: now,
            updated_at: now,
        };
        state.tasks.push(StoredTask {
            record: record.clone(),
            deleted: false,
        });
        Ok(record)
    }

    async fn update_task(
        &self,
        id: &TaskId,
        changes: &TaskChanges,
    ) -> PersistenceResult<TaskRecord> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::UpdateTask, Some(id.as_str()))?;
        let record = state.live_task_mut(id)?;
        if let Some(title) = &changes.title {
            record.title = title.clone();
        }
        if let Some(description) = &changes.description {
            record.description = description.clone();
        }
        if let Some(priority) = changes.priority {
            record.priority = priority;
        }
        if let Some(assignee) = &changes.assignee {
            record.assignee = assignee.clone();
        }
        if let Some(attachments) = &changes.attachments {
            record.attachments = attachments.clone();
        }
        if let Some(position) = changes.position {
            record.position = position;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete_task(&self, id: &TaskId) -> PersistenceResult<()> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::DeleteTask, Some(id.as_str()))?;
        let stored = state
            .tasks
            .iter_mut()
            .find(|t| &t.record.id == id && !t.deleted)
            .ok_or_else(|| PersistenceError::not_found(format!("task {}", id)))?;
        stored.deleted = true;
        stored.record.updated_at = Utc::now();
        Ok(())
    }

    async fn update_task_column_and_status(
        &self,
        id: &TaskId,
        column_id: &ColumnId,
        status: &TaskStatus,
    ) -> PersistenceResult<()> {
        let mut state = self.state.lock().await;
        state.enter(PersistenceOp::UpdateTaskColumnAndStatus, Some(id.as_str()))?;
        let record = state.live_task_mut(id)?;
        record.column_id = column_id.clone();
        record.status = status.clone();
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, Task};

    fn project() -> Project {
        let todo = Column::new("To Do", TaskStatus::Todo, "status-todo")
            .with_id("todo")
            .with_tasks(vec![Task::new("one", TaskStatus::Todo).with_id("T1")]);
        Project::new("P").with_columns(vec![todo])
    }

    #[tokio::test]
    async fn test_soft_delete_hides_rows() {
        let backend = MemoryPersistence::with_project(&project());
        backend.delete_task(&"T1".into()).await.unwrap();

        assert!(backend.list_tasks(None).await.unwrap().is_empty());
        let (_, deleted) = backend.task_row(&"T1".into()).await.unwrap();
        assert!(deleted);
        assert!(backend.update_task(&"T1".into(), &TaskChanges::position(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_once_targets_single_row() {
        let backend = MemoryPersistence::with_project(&project());
        backend
            .fail_once(PersistenceOp::UpdateTask, Some("T1"))
            .await;

        let first = backend.update_task(&"T1".into(), &TaskChanges::position(0)).await;
        assert!(first.is_err());
        let second = backend.update_task(&"T1".into(), &TaskChanges::position(0)).await;
        assert!(second.is_ok());
        assert_eq!(backend.writes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reads_are_not_logged_as_writes() {
        let backend = MemoryPersistence::with_project(&project());
        backend.list_projects().await.unwrap();
        backend.list_columns(None).await.unwrap();
        assert!(backend.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_column_cascades() {
        let backend = MemoryPersistence::with_project(&project());
        backend.delete_column(&"todo".into()).await.unwrap();
        assert!(backend.list_columns(None).await.unwrap().is_empty());
        assert!(backend.task_row(&"T1".into()).await.is_none());
    }
}
