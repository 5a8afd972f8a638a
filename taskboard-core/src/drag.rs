//! Drag interaction resolver
//!
//! A drag gesture arrives as two raw ids: the element that was dragged and
//! the element it was released over. Column drag handles carry a reserved
//! prefix (`column-` by default), so a raw id is either a column handle or a
//! task id and never both.
//!
//! [`resolve_drop`] turns a gesture into a [`DropAction`] without touching
//! any state; [`DragResolver`] runs that action through a [`BoardSession`].

use crate::config::BoardConfig;
use crate::error::Result;
use crate::ordering::moved;
use crate::reconcile::BoardSession;
use crate::types::{ColumnId, Project, TaskId};
use tracing::{debug, warn};

/// What a raw drag id refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragTarget {
    Column(ColumnId),
    Task(TaskId),
}

impl DragTarget {
    /// Classify a raw id by the column handle prefix
    pub fn parse(raw: &str, column_prefix: &str) -> Self {
        match raw.strip_prefix(column_prefix) {
            Some(column) => Self::Column(ColumnId::from_string(column)),
            None => Self::Task(TaskId::from_string(raw)),
        }
    }
}

/// The drag id a UI should give a column's handle
pub fn column_handle(column_prefix: &str, id: &ColumnId) -> String {
    format!("{}{}", column_prefix, id)
}

/// The board change a drop resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropAction {
    /// Nothing to do
    None,
    /// New full column order
    ReorderColumns(Vec<ColumnId>),
    /// New full task order within one column
    ReorderTasks { column: ColumnId, order: Vec<TaskId> },
    /// Cross-column move; `index` of `None` appends
    MoveTask {
        task: TaskId,
        from: ColumnId,
        to: ColumnId,
        index: Option<usize>,
    },
}

impl DropAction {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One-step move direction. For columns `Up` is left and `Down` is right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn step(self, index: usize, len: usize) -> Option<usize> {
        match self {
            Self::Up => index.checked_sub(1),
            Self::Down => (index + 1 < len).then_some(index + 1),
        }
    }
}

/// Resolve a drop of `active` over `over` against `project`.
pub fn resolve_drop(
    project: &Project,
    active: &str,
    over: Option<&str>,
    column_prefix: &str,
) -> DropAction {
    let Some(over) = over else {
        return DropAction::None;
    };
    if active == over {
        return DropAction::None;
    }

    match (
        DragTarget::parse(active, column_prefix),
        DragTarget::parse(over, column_prefix),
    ) {
        (DragTarget::Column(active), DragTarget::Column(over)) => {
            resolve_column_drop(project, &active, &over)
        }
        (DragTarget::Column(_), DragTarget::Task(_)) => DropAction::None,
        (DragTarget::Task(task), over) => resolve_task_drop(project, &task, &over),
    }
}

fn resolve_column_drop(project: &Project, active: &ColumnId, over: &ColumnId) -> DropAction {
    let (Some(from), Some(to)) = (project.column_index(active), project.column_index(over)) else {
        debug!(active = %active, over = %over, "Column drop names an unknown column");
        return DropAction::None;
    };
    if from == to {
        return DropAction::None;
    }
    DropAction::ReorderColumns(moved(&project.column_ids(), from, to))
}

fn resolve_task_drop(project: &Project, task: &TaskId, over: &DragTarget) -> DropAction {
    let Some(source) = project.column_of(task) else {
        warn!(task = %task, "Dragged task is not on the board");
        return DropAction::None;
    };

    // Destination column, and the slot of the task under the pointer if any
    let (dest, over_index) = match over {
        DragTarget::Column(id) => match project.find_column(id) {
            Some(column) => (column, None),
            None => return DropAction::None,
        },
        DragTarget::Task(id) => match project.column_of(id) {
            Some(column) => (column, column.task_index(id)),
            None => return DropAction::None,
        },
    };

    if dest.id == source.id {
        let Some(from) = source.task_index(task) else {
            return DropAction::None;
        };
        let to = over_index.unwrap_or(source.tasks.len() - 1);
        if from == to {
            return DropAction::None;
        }
        return DropAction::ReorderTasks {
            column: source.id.clone(),
            order: moved(&source.task_ids(), from, to),
        };
    }

    DropAction::MoveTask {
        task: task.clone(),
        from: source.id.clone(),
        to: dest.id.clone(),
        index: over_index,
    }
}

/// Move a column one slot left (`Up`) or right (`Down`)
pub fn resolve_column_step(project: &Project, column: &ColumnId, direction: Direction) -> DropAction {
    let Some(from) = project.column_index(column) else {
        return DropAction::None;
    };
    match direction.step(from, project.columns.len()) {
        Some(to) => DropAction::ReorderColumns(moved(&project.column_ids(), from, to)),
        None => DropAction::None,
    }
}

/// Move a task one slot up or down inside its column
pub fn resolve_task_step(project: &Project, task: &TaskId, direction: Direction) -> DropAction {
    let Some(column) = project.column_of(task) else {
        return DropAction::None;
    };
    let Some(from) = column.task_index(task) else {
        return DropAction::None;
    };
    match direction.step(from, column.tasks.len()) {
        Some(to) => DropAction::ReorderTasks {
            column: column.id.clone(),
            order: moved(&column.task_ids(), from, to),
        },
        None => DropAction::None,
    }
}

/// Runs resolved drops against a board session
#[derive(Debug, Clone)]
pub struct DragResolver {
    column_prefix: String,
    refresh_after_drop: bool,
}

impl Default for DragResolver {
    fn default() -> Self {
        Self::new(&BoardConfig::default())
    }
}

impl DragResolver {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            column_prefix: config.column_handle_prefix.clone(),
            refresh_after_drop: config.refresh_after_drop,
        }
    }

    pub fn column_handle(&self, id: &ColumnId) -> String {
        column_handle(&self.column_prefix, id)
    }

    pub fn resolve(&self, project: &Project, active: &str, over: Option<&str>) -> DropAction {
        resolve_drop(project, active, over, &self.column_prefix)
    }

    /// Resolve and apply a drop.
    ///
    /// Returns the action that was applied, or [`DropAction::None`] when the
    /// drop changed nothing. Persistence failures come back after the session
    /// has rolled the board back.
    pub async fn handle_drop(
        &self,
        session: &mut BoardSession,
        active: &str,
        over: Option<&str>,
    ) -> Result<DropAction> {
        let action = self.resolve(session.project(), active, over);
        debug!(active, over = ?over, action = ?action, "Resolved drop");
        self.apply(session, action).await
    }

    /// Move a column one slot with an explicit control
    pub async fn move_column(
        &self,
        session: &mut BoardSession,
        column: &ColumnId,
        direction: Direction,
    ) -> Result<DropAction> {
        let action = resolve_column_step(session.project(), column, direction);
        self.apply(session, action).await
    }

    /// Move a task one slot with an explicit control
    pub async fn move_task(
        &self,
        session: &mut BoardSession,
        task: &TaskId,
        direction: Direction,
    ) -> Result<DropAction> {
        let action = resolve_task_step(session.project(), task, direction);
        self.apply(session, action).await
    }

    async fn apply(&self, session: &mut BoardSession, action: DropAction) -> Result<DropAction> {
        let changed = match &action {
            DropAction::None => false,
            DropAction::ReorderColumns(order) => session.reorder_columns(order).await?,
            DropAction::ReorderTasks { column, order } => {
                session.reorder_tasks(column, order).await?
            }
            DropAction::MoveTask {
                task,
                from,
                to,
                index,
            } => session.move_task(task, from, to, *index).await?,
        };
        if !changed {
            return Ok(DropAction::None);
        }

        if self.refresh_after_drop {
            if let Err(error) = session.refresh().await {
                warn!(%error, "Refresh after drop failed");
            }
        }
        Ok(action)
    }
}
