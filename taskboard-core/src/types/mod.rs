//! Core types for the board engine

mod board;
mod ids;
mod task;

// Re-export all types
pub use board::{Column, ColumnTemplate, Project, ProjectPatch};
pub use ids::{ColumnId, ProjectId, TaskId};
pub use task::{Priority, Task, TaskPatch, TaskStatus};
