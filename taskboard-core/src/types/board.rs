//! Board-level types: Project, Column, ColumnTemplate

use super::ids::{ColumnId, ProjectId, TaskId};
use super::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A project owns an ordered list of columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Project {
    /// Create an empty project with the given name
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
            columns: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = columns;
        self
    }

    pub fn find_column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    pub fn column_index(&self, id: &ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| &c.id == id)
    }

    /// Locate a task as `(column index, task index)`
    pub fn locate_task(&self, id: &TaskId) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(ci, column)| {
            column.task_index(id).map(|ti| (ci, ti))
        })
    }

    /// The column currently holding a task
    pub fn column_of(&self, id: &TaskId) -> Option<&Column> {
        self.locate_task(id).map(|(ci, _)| &self.columns[ci])
    }

    pub fn find_task(&self, id: &TaskId) -> Option<&Task> {
        self.locate_task(id)
            .map(|(ci, ti)| &self.columns[ci].tasks[ti])
    }

    pub fn column_ids(&self) -> Vec<ColumnId> {
        self.columns.iter().map(|c| c.id.clone()).collect()
    }

    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum()
    }
}

/// A column is a workflow stage holding an ordered list of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub title: String,
    /// Status every task in this column carries
    pub status: TaskStatus,
    /// Presentation hint, opaque to the engine
    pub color: String,
    /// Index within the project, dense from zero once settled
    pub order: usize,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Column {
    /// Create an empty column with a fresh id
    pub fn new(title: impl Into<String>, status: TaskStatus, color: impl Into<String>) -> Self {
        Self {
            id: ColumnId::new(),
            title: title.into(),
            status,
            color: color.into(),
            order: 0,
            tasks: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ColumnId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn task_index(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.task_index(id).is_some()
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }
}

/// Blueprint for the columns a new project starts with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTemplate {
    pub title: String,
    pub status: TaskStatus,
    pub color: String,
}

impl ColumnTemplate {
    pub fn new(title: impl Into<String>, status: TaskStatus, color: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status,
            color: color.into(),
        }
    }

    /// Get the default columns for a new project
    pub fn defaults() -> Vec<ColumnTemplate> {
        vec![
            Self::new("To Do", TaskStatus::Todo, "status-todo"),
            Self::new("In Progress", TaskStatus::InProgress, "status-progress"),
            Self::new("Done", TaskStatus::Done, "status-done"),
            Self::new("Deployed", TaskStatus::Deployed, "status-deployed"),
        ]
    }
}

/// Field mask for project edits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `Some(None)` clears the description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
}

impl ProjectPatch {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Project {
        let todo = Column::new("To Do", TaskStatus::Todo, "status-todo")
            .with_id("todo")
            .with_tasks(vec![Task::new("a", TaskStatus::Todo).with_id("t1")]);
        let done = Column::new("Done", TaskStatus::Done, "status-done")
            .with_id("done")
            .with_order(1)
            .with_tasks(vec![Task::new("b", TaskStatus::Done).with_id("t2")]);
        Project::new("Test").with_columns(vec![todo, done])
    }

    #[test]
    fn test_locate_task() {
        let project = board();
        assert_eq!(project.locate_task(&"t2".into()), Some((1, 0)));
        assert_eq!(project.column_of(&"t1".into()).unwrap().id.as_str(), "todo");
        assert!(project.locate_task(&"missing".into()).is_none());
        assert_eq!(project.task_count(), 2);
    }

    #[test]
    fn test_default_columns() {
        let cols = ColumnTemplate::defaults();
        assert_eq!(cols.len(), 4);
        assert_eq!(cols[0].status, TaskStatus::Todo);
        assert_eq!(cols[3].color, "status-deployed");
    }
}
