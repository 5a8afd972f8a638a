//! BoardStore - the in-memory snapshot of one project's board
//!
//! Every method here is synchronous and touches nothing but the owned
//! snapshot. Structural problems (unknown ids, bad permutations) are rejected
//! before anything is mutated, so a failed call never leaves a half-applied
//! change behind. Durability is the reconciliation layer's job.

use crate::error::{BoardError, Result};
use crate::ordering::{array_move, check_permutation, renumber_columns, renumber_tasks};
use crate::types::{Column, ColumnId, Priority, Project, Task, TaskId, TaskPatch};
use chrono::Utc;
use tracing::{debug, warn};

/// Input for [`BoardStore::create_task`]
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub attachments: Vec<String>,
    /// Insert at this index instead of appending
    pub index: Option<usize>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_attachment(mut self, url: impl Into<String>) -> Self {
        self.attachments.push(url.into());
        self
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// Owned snapshot of a project with its columns and tasks
#[derive(Debug, Clone, PartialEq)]
pub struct BoardStore {
    project: Project,
}

impl BoardStore {
    /// Wrap a project snapshot, normalizing it into canonical form
    pub fn new(project: Project) -> Self {
        let mut store = Self { project };
        store.normalize();
        store
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn columns(&self) -> &[Column] {
        &self.project.columns
    }

    pub fn find_column(&self, id: &ColumnId) -> Option<&Column> {
        self.project.find_column(id)
    }

    pub fn find_task(&self, id: &TaskId) -> Option<&Task> {
        self.project.find_task(id)
    }

    /// The column currently holding `task_id`
    pub fn column_of(&self, task_id: &TaskId) -> Option<&Column> {
        self.project.column_of(task_id)
    }

    /// Copy of the full snapshot, for rollback
    pub fn snapshot(&self) -> Project {
        self.project.clone()
    }

    /// Put back a snapshot taken earlier with [`BoardStore::snapshot`]
    pub fn restore(&mut self, snapshot: Project) {
        self.project = snapshot;
    }

    /// Replace the whole snapshot with freshly loaded state
    pub fn replace(&mut self, project: Project) {
        self.project = project;
        self.normalize();
    }

    /// Renumber columns and tasks densely and force task status to match its column.
    fn normalize(&mut self) {
        renumber_columns(&mut self.project.columns);
        for column in &mut self.project.columns {
            for task in &mut column.tasks {
                if task.status != column.status {
                    debug!(
                        task = %task.id,
                        column = %column.id,
                        from = %task.status,
                        to = %column.status,
                        "Aligning task status with its column"
                    );
                    task.status = column.status.clone();
                }
            }
            renumber_tasks(&mut column.tasks);
        }
    }

    fn column_index(&self, id: &ColumnId) -> Result<usize> {
        self.project.column_index(id).ok_or_else(|| {
            warn!(column = %id, "Column not found in board snapshot");
            BoardError::ColumnNotFound { id: id.to_string() }
        })
    }

    fn locate_task(&self, id: &TaskId) -> Result<(usize, usize)> {
        self.project.locate_task(id).ok_or_else(|| {
            warn!(task = %id, "Task not found in board snapshot");
            BoardError::TaskNotFound { id: id.to_string() }
        })
    }

    // =========================================================================
    // Task operations
    // =========================================================================

    /// Create a task in `column_id`, inheriting the column's status.
    ///
    /// Appends unless the draft names an index.
    pub fn create_task(&mut self, column_id: &ColumnId, draft: TaskDraft) -> Result<Task> {
        if draft.title.trim().is_empty() {
            return Err(BoardError::missing_field("title"));
        }
        let ci = self.column_index(column_id)?;
        let column = &mut self.project.columns[ci];

        let mut task = Task::new(draft.title, column.status.clone());
        task.description = draft.description;
        task.priority = draft.priority;
        task.assignee = draft.assignee;
        task.attachments = draft.attachments;

        let index = draft
            .index
            .map(|i| i.min(column.tasks.len()))
            .unwrap_or(column.tasks.len());
        column.tasks.insert(index, task);
        renumber_tasks(&mut column.tasks);

        let created = column.tasks[index].clone();
        debug!(task = %created.id, column = %column_id, position = index, "Created task");
        Ok(created)
    }

    /// Put an existing task (e.g. one read back from storage) into a column.
    pub fn insert_task(
        &mut self,
        column_id: &ColumnId,
        mut task: Task,
        index: Option<usize>,
    ) -> Result<()> {
        if self.project.locate_task(&task.id).is_some() {
            return Err(BoardError::duplicate_id("task", task.id.to_string()));
        }
        let ci = self.column_index(column_id)?;
        let column = &mut self.project.columns[ci];
        task.status = column.status.clone();
        let index = index
            .map(|i| i.min(column.tasks.len()))
            .unwrap_or(column.tasks.len());
        column.tasks.insert(index, task);
        renumber_tasks(&mut column.tasks);
        Ok(())
    }

    /// Merge `patch` into the task. Status and position are never touched here.
    pub fn update_task(&mut self, task_id: &TaskId, patch: &TaskPatch) -> Result<Task> {
        patch.validate()?;
        let (ci, ti) = self.locate_task(task_id)?;
        let task = &mut self.project.columns[ci].tasks[ti];
        patch.apply_to(task);
        debug!(task = %task_id, "Updated task");
        Ok(task.clone())
    }

    /// Remove a task from whichever column holds it
    pub fn delete_task(&mut self, task_id: &TaskId) -> Result<Task> {
        let (ci, ti) = self.locate_task(task_id)?;
        let column = &mut self.project.columns[ci];
        let removed = column.tasks.remove(ti);
        renumber_tasks(&mut column.tasks);
        debug!(task = %task_id, column = %column.id, "Deleted task");
        Ok(removed)
    }

    /// Move a task from `source` to `dest` at `dest_index` (default: end).
    ///
    /// Within one column this is a plain relocation. Across columns the task
    /// takes the destination's status and both columns are renumbered.
    /// Returns whether anything changed.
    pub fn move_task(
        &mut self,
        task_id: &TaskId,
        source: &ColumnId,
        dest: &ColumnId,
        dest_index: Option<usize>,
    ) -> Result<bool> {
        let si = self.column_index(source)?;
        let di = self.column_index(dest)?;
        let from = self.project.columns[si].task_index(task_id).ok_or_else(|| {
            warn!(task = %task_id, column = %source, "Task is not in the source column");
            BoardError::TaskNotInColumn {
                task: task_id.to_string(),
                column: source.to_string(),
            }
        })?;

        if si == di {
            let column = &mut self.project.columns[si];
            let last = column.tasks.len() - 1;
            let to = dest_index.map(|i| i.min(last)).unwrap_or(last);
            if to == from {
                return Ok(false);
            }
            array_move(&mut column.tasks, from, to);
            renumber_tasks(&mut column.tasks);
            debug!(task = %task_id, column = %source, from, to, "Reordered task within column");
            return Ok(true);
        }

        let mut task = self.project.columns[si].tasks.remove(from);
        renumber_tasks(&mut self.project.columns[si].tasks);

        let dest_column = &mut self.project.columns[di];
        task.status = dest_column.status.clone();
        task.updated_at = Utc::now();
        let to = dest_index
            .map(|i| i.min(dest_column.tasks.len()))
            .unwrap_or(dest_column.tasks.len());
        dest_column.tasks.insert(to, task);
        renumber_tasks(&mut dest_column.tasks);

        debug!(task = %task_id, from = %source, to = %dest, index = to, "Moved task across columns");
        Ok(true)
    }

    /// Replace a column's task order with `order`, which must be a permutation
    /// of its current members. Returns whether the order changed.
    pub fn reorder_tasks(&mut self, column_id: &ColumnId, order: &[TaskId]) -> Result<bool> {
        let ci = self.column_index(column_id)?;
        let column = &mut self.project.columns[ci];
        let current = column.task_ids();

        check_permutation(&current, order).map_err(|message| {
            debug!(column = %column_id, %message, "Rejected task order");
            BoardError::invalid_permutation("task", message)
        })?;
        if current.as_slice() == order {
            return Ok(false);
        }

        let mut remaining = std::mem::take(&mut column.tasks);
        let mut tasks = Vec::with_capacity(order.len());
        for id in order {
            if let Some(i) = remaining.iter().position(|t| &t.id == id) {
                tasks.push(remaining.swap_remove(i));
            }
        }
        renumber_tasks(&mut tasks);
        column.tasks = tasks;

        debug!(column = %column_id, count = order.len(), "Reordered tasks");
        Ok(true)
    }

    /// Replace the project's column order. Returns whether the order changed.
    pub fn reorder_columns(&mut self, order: &[ColumnId]) -> Result<bool> {
        let current = self.project.column_ids();
        check_permutation(&current, order).map_err(|message| {
            debug!(%message, "Rejected column order");
            BoardError::invalid_permutation("column", message)
        })?;
        if current.as_slice() == order {
            return Ok(false);
        }

        let mut remaining = std::mem::take(&mut self.project.columns);
        let mut columns = Vec::with_capacity(order.len());
        for id in order {
            if let Some(i) = remaining.iter().position(|c| &c.id == id) {
                columns.push(remaining.swap_remove(i));
            }
        }
        renumber_columns(&mut columns);
        self.project.columns = columns;

        debug!(count = order.len(), "Reordered columns");
        Ok(true)
    }

    // =========================================================================
    // Column operations
    // =========================================================================

    /// Append a column at the end of the board
    pub fn add_column(&mut self, mut column: Column) -> Result<Column> {
        if self.project.find_column(&column.id).is_some() {
            return Err(BoardError::duplicate_id("column", column.id.to_string()));
        }
        if column.title.trim().is_empty() {
            return Err(BoardError::missing_field("title"));
        }
        column.order = self.project.columns.len();
        for task in &mut column.tasks {
            task.status = column.status.clone();
        }
        renumber_tasks(&mut column.tasks);
        self.project.columns.push(column.clone());
        debug!(column = %column.id, order = column.order, "Added column");
        Ok(column)
    }

    /// Remove a column along with its tasks
    pub fn remove_column(&mut self, column_id: &ColumnId) -> Result<Column> {
        let ci = self.column_index(column_id)?;
        let removed = self.project.columns.remove(ci);
        renumber_columns(&mut self.project.columns);
        debug!(column = %column_id, tasks = removed.tasks.len(), "Removed column");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::{columns_are_dense, tasks_are_dense};
    use crate::types::TaskStatus;

    fn ids(column: &Column) -> Vec<&str> {
        column.tasks.iter().map(|t| t.id.as_str()).collect()
    }

    fn setup() -> BoardStore {
        let todo = Column::new("To Do", TaskStatus::Todo, "status-todo")
            .with_id("todo")
            .with_tasks(vec![
                Task::new("one", TaskStatus::Todo).with_id("T1"),
                Task::new("two", TaskStatus::Todo).with_id("T2"),
                Task::new("three", TaskStatus::Todo).with_id("T3"),
            ]);
        let done = Column::new("Done", TaskStatus::Done, "status-done")
            .with_id("done")
            .with_tasks(vec![Task::new("nine", TaskStatus::Done).with_id("T9")]);
        BoardStore::new(Project::new("Test").with_columns(vec![todo, done]))
    }

    #[test]
    fn test_new_normalizes_positions_and_status() {
        let mut stray = Task::new("stray", TaskStatus::Done).with_id("S");
        stray.position = 42;
        let column = Column::new("To Do", TaskStatus::Todo, "c")
            .with_id("todo")
            .with_order(5)
            .with_tasks(vec![stray]);
        let store = BoardStore::new(Project::new("P").with_columns(vec![column]));

        let task = store.find_task(&"S".into()).unwrap();
        assert_eq!(task.position, 0);
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(store.columns()[0].order, 0);
    }

    #[test]
    fn test_create_task_appends_with_column_status() {
        let mut store = setup();
        let task = store
            .create_task(&"done".into(), TaskDraft::new("ship it").with_priority(Priority::High))
            .unwrap();

        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.position, 1);
        assert_eq!(task.priority, Some(Priority::High));
        assert_eq!(store.columns()[1].tasks.len(), 2);
    }

    #[test]
    fn test_create_task_at_index() {
        let mut store = setup();
        let task = store
            .create_task(&"todo".into(), TaskDraft::new("first").at_index(0))
            .unwrap();
        assert_eq!(task.position, 0);
        assert_eq!(store.columns()[0].tasks[1].id.as_str(), "T1");
        assert!(tasks_are_dense(&store.columns()[0].tasks));
    }

    #[test]
    fn test_create_task_unknown_column() {
        let mut store = setup();
        let before = store.clone();
        let result = store.create_task(&"nope".into(), TaskDraft::new("x"));
        assert!(matches!(result, Err(BoardError::ColumnNotFound { .. })));
        assert_eq!(store, before);
    }

    #[test]
    fn test_update_task_leaves_status_and_position() {
        let mut store = setup();
        let updated = store
            .update_task(&"T2".into(), &TaskPatch::new().with_title("renamed"))
            .unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.position, 1);
        assert_eq!(updated.status, TaskStatus::Todo);
    }

    #[test]
    fn test_update_missing_task() {
        let mut store = setup();
        let result = store.update_task(&"nope".into(), &TaskPatch::new().with_title("x"));
        assert!(matches!(result, Err(BoardError::TaskNotFound { .. })));
    }

    #[test]
    fn test_delete_task_renumbers() {
        let mut store = setup();
        store.delete_task(&"T1".into()).unwrap();
        let todo = &store.columns()[0];
        assert_eq!(ids(todo), vec!["T2", "T3"]);
        assert!(tasks_are_dense(&todo.tasks));
        assert!(store.delete_task(&"T1".into()).is_err());
    }

    #[test]
    fn test_move_within_column() {
        let mut store = setup();
        let changed = store
            .move_task(&"T2".into(), &"todo".into(), &"todo".into(), Some(0))
            .unwrap();
        assert!(changed);
        assert_eq!(ids(&store.columns()[0]), vec!["T2", "T1", "T3"]);
        assert!(tasks_are_dense(&store.columns()[0].tasks));
    }

    #[test]
    fn test_move_onto_own_position_is_noop() {
        let mut store = setup();
        let before = store.clone();
        let changed = store
            .move_task(&"T2".into(), &"todo".into(), &"todo".into(), Some(1))
            .unwrap();
        assert!(!changed);
        assert_eq!(store, before);
    }

    #[test]
    fn test_move_across_columns_before_target() {
        let mut store = setup();
        store
            .move_task(&"T1".into(), &"todo".into(), &"done".into(), Some(0))
            .unwrap();

        let todo = &store.columns()[0];
        let done = &store.columns()[1];
        assert_eq!(ids(todo), vec!["T2", "T3"]);
        assert_eq!(ids(done), vec!["T1", "T9"]);
        assert_eq!(done.tasks[0].status, TaskStatus::Done);
        assert!(tasks_are_dense(&todo.tasks));
        assert!(tasks_are_dense(&done.tasks));
    }

    #[test]
    fn test_move_rejects_wrong_source_without_mutation() {
        let mut store = setup();
        let before = store.clone();
        let result = store.move_task(&"T9".into(), &"todo".into(), &"done".into(), None);
        assert!(matches!(result, Err(BoardError::TaskNotInColumn { .. })));
        let result = store.move_task(&"T1".into(), &"todo".into(), &"nope".into(), None);
        assert!(matches!(result, Err(BoardError::ColumnNotFound { .. })));
        assert_eq!(store, before);
    }

    #[test]
    fn test_reorder_tasks() {
        let mut store = setup();
        let changed = store
            .reorder_tasks(&"todo".into(), &["T3".into(), "T1".into(), "T2".into()])
            .unwrap();
        assert!(changed);
        assert_eq!(ids(&store.columns()[0]), vec!["T3", "T1", "T2"]);
        assert!(tasks_are_dense(&store.columns()[0].tasks));
    }

    #[test]
    fn test_reorder_tasks_identity_is_noop() {
        let mut store = setup();
        let before = store.clone();
        let current = store.columns()[0].task_ids();
        assert!(!store.reorder_tasks(&"todo".into(), &current).unwrap());
        assert_eq!(store, before);
    }

    #[test]
    fn test_reorder_tasks_rejects_bad_permutation() {
        let mut store = setup();
        let before = store.clone();
        let result = store.reorder_tasks(&"todo".into(), &["T1".into(), "T9".into(), "T2".into()]);
        assert!(matches!(result, Err(BoardError::InvalidPermutation { .. })));
        let result = store.reorder_tasks(&"todo".into(), &["T1".into(), "T2".into()]);
        assert!(matches!(result, Err(BoardError::InvalidPermutation { .. })));
        assert_eq!(store, before);
    }

    #[test]
    fn test_reorder_columns() {
        let mut store = setup();
        store
            .reorder_columns(&["done".into(), "todo".into()])
            .unwrap();
        assert_eq!(store.columns()[0].id.as_str(), "done");
        assert!(columns_are_dense(store.columns()));
        assert!(store.reorder_columns(&["done".into()]).is_err());
    }

    #[test]
    fn test_add_and_remove_column() {
        let mut store = setup();
        let added = store
            .add_column(Column::new("Blocked", TaskStatus::from("blocked"), "red").with_id("blocked"))
            .unwrap();
        assert_eq!(added.order, 2);
        assert!(store.add_column(Column::new("Dup", TaskStatus::Todo, "x").with_id("todo")).is_err());

        let removed = store.remove_column(&"todo".into()).unwrap();
        assert_eq!(removed.tasks.len(), 3);
        assert_eq!(store.columns()[0].id.as_str(), "done");
        assert!(columns_are_dense(store.columns()));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut store = setup();
        let snapshot = store.snapshot();
        store.delete_task(&"T1".into()).unwrap();
        store.restore(snapshot.clone());
        assert_eq!(store.project(), &snapshot);
    }
}
