//! Ordering, optimistic reconciliation and drag-and-drop resolution for project boards
//!
//! This crate holds the core of a project board: tasks kept in ordered
//! columns, columns kept in order within a project, and the machinery that
//! keeps a local, instantly updated view consistent with a remote store that
//! can fail at any time.
//!
//! ## Overview
//!
//! - **Board State Store** - [`BoardStore`] owns one project snapshot and
//!   mutates it synchronously; structural mistakes are rejected before anything changes
//! - **Reconciliation** - [`BoardSession`] applies each action locally first,
//!   persists it, and restores the pre-action snapshot if any write fails
//! - **Drag resolution** - [`resolve_drop`] turns "dragged X over Y" into a
//!   [`DropAction`]; [`DragResolver`] runs it through a session
//! - **Catalog** - [`ProjectCatalog`] lists, creates, edits and deletes projects
//!
//! Storage, attachment upload and identity are collaborators behind traits
//! ([`Persistence`], [`AttachmentStorage`], [`IdentityProvider`]).
//! [`MemoryPersistence`] is an in-process backend with failure injection.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskboard_core::{
//!     BoardConfig, DragResolver, MemoryPersistence, ProjectCatalog, StaticIdentity,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BoardConfig::load()?;
//! let mut catalog = ProjectCatalog::new(
//!     Arc::new(MemoryPersistence::new()),
//!     Arc::new(StaticIdentity::user("user-1")),
//!     config.clone(),
//! );
//!
//! let project = catalog.create_project("Launch", None).await?;
//! let mut session = catalog.open_board(&project.id).await?;
//!
//! // Drag the third column handle onto the first one
//! let resolver = DragResolver::new(&config);
//! let dragged = resolver.column_handle(&project.columns[2].id);
//! let target = resolver.column_handle(&project.columns[0].id);
//! resolver.handle_drop(&mut session, &dragged, Some(&target)).await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod drag;
mod error;
pub mod ordering;
pub mod persistence;
pub mod reconcile;
pub mod store;
pub mod types;

pub use catalog::ProjectCatalog;
pub use collaborators::{
    AttachmentStorage, AttachmentUpload, IdentityProvider, MemoryAttachmentStorage,
    StaticIdentity,
};
pub use config::{BoardConfig, ConfigError};
pub use drag::{
    column_handle, resolve_drop, Direction, DragResolver, DragTarget, DropAction,
};
pub use error::{BoardError, PersistenceError, PersistenceErrorKind, Result};
pub use persistence::{MemoryPersistence, Persistence, PersistenceOp};
pub use reconcile::{BoardSession, CreateTaskRequest};
pub use store::{BoardStore, TaskDraft};

// Re-export commonly used types
pub use types::{
    Column, ColumnId, ColumnTemplate, Priority, Project, ProjectId, ProjectPatch, Task, TaskId,
    TaskPatch, TaskStatus,
};
