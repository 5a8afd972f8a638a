//! BoardSession - optimistic board mutations backed by a persistence collaborator
//!
//! Every logical action follows the same sequence:
//!
//! 1. snapshot the board,
//! 2. apply the change to the [`BoardStore`] right away,
//! 3. send the durable writes the change implies,
//! 4. on any write failure put the snapshot back and return the error.
//!
//! Writes are grouped into stages. Stages run one after another; the rows
//! inside a stage are sent concurrently and awaited together. A failure in any
//! row fails the whole action, however many other rows already landed, and
//! the local board goes back to exactly what it was before the action.

use crate::collaborators::{AttachmentStorage, AttachmentUpload, IdentityProvider};
use crate::config::BoardConfig;
use crate::error::{BoardError, PersistenceError, Result};
use crate::persistence::{load_project, ColumnRecord, NewColumn, NewTask, Persistence, TaskChanges};
use crate::store::{BoardStore, TaskDraft};
use crate::types::{Column, ColumnId, Project, ProjectId, Task, TaskId, TaskPatch, TaskStatus};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A single durable write
#[derive(Debug, Clone, PartialEq)]
enum Write {
    UpdateTask(TaskId, TaskChanges),
    DeleteTask(TaskId),
    TaskColumnAndStatus {
        id: TaskId,
        column: ColumnId,
        status: TaskStatus,
    },
    ColumnOrder(Vec<ColumnRecord>),
    DeleteColumn(ColumnId),
}

/// Ordered stages of writes belonging to one logical action
#[derive(Debug, Default)]
struct WritePlan {
    stages: Vec<Vec<Write>>,
}

impl WritePlan {
    fn none() -> Self {
        Self::default()
    }

    fn stage(mut self, writes: Vec<Write>) -> Self {
        if !writes.is_empty() {
            self.stages.push(writes);
        }
        self
    }

    fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn len(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }
}

/// Position writes for every task in `column`
fn column_positions(column: &Column) -> Vec<Write> {
    column
        .tasks
        .iter()
        .map(|t| Write::UpdateTask(t.id.clone(), TaskChanges::position(t.position)))
        .collect()
}

/// Full rows for every column, carrying their current order
fn column_order_rows(project: &Project) -> Vec<ColumnRecord> {
    project
        .columns
        .iter()
        .map(|c| ColumnRecord::from_column(&project.id, c))
        .collect()
}

/// Optional fields for [`BoardSession::create_task`]
#[derive(Debug, Clone, Default)]
pub struct CreateTaskRequest {
    pub draft: TaskDraft,
    pub uploads: Vec<AttachmentUpload>,
}

impl CreateTaskRequest {
    pub fn new(draft: TaskDraft) -> Self {
        Self {
            draft,
            uploads: Vec::new(),
        }
    }

    pub fn with_upload(mut self, upload: AttachmentUpload) -> Self {
        self.uploads.push(upload);
        self
    }
}

/// One project's board, kept in sync with durable storage
pub struct BoardSession {
    store: BoardStore,
    persistence: Arc<dyn Persistence>,
    attachments: Option<Arc<dyn AttachmentStorage>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    config: BoardConfig,
}

impl BoardSession {
    /// Open a session with an initial fetch of `project_id`
    pub async fn open(
        persistence: Arc<dyn Persistence>,
        project_id: &ProjectId,
        config: BoardConfig,
    ) -> Result<Self> {
        let project = load_project(persistence.as_ref(), project_id).await?;
        Ok(Self::from_project(persistence, project, config))
    }

    /// Wrap an already loaded snapshot
    pub fn from_project(
        persistence: Arc<dyn Persistence>,
        project: Project,
        config: BoardConfig,
    ) -> Self {
        Self {
            store: BoardStore::new(project),
            persistence,
            attachments: None,
            identity: None,
            config,
        }
    }

    pub fn with_attachments(mut self, attachments: Arc<dyn AttachmentStorage>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn project(&self) -> &Project {
        self.store.project()
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.store.project().id
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Replace the local board with what storage currently holds.
    ///
    /// On failure the local board is left as it was.
    pub async fn refresh(&mut self) -> Result<()> {
        let id = self.project_id().clone();
        let project = load_project(self.persistence.as_ref(), &id).await?;
        self.store.replace(project);
        info!(project = %id, "Refreshed board from storage");
        Ok(())
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Create a task in `column_id`.
    ///
    /// The task shows up locally at once under a temporary id; after the
    /// insert succeeds it takes the stored id and timestamps.
    pub async fn create_task(
        &mut self,
        column_id: &ColumnId,
        request: CreateTaskRequest,
    ) -> Result<Task> {
        let CreateTaskRequest { mut draft, uploads } = request;
        if draft.title.trim().is_empty() {
            return Err(BoardError::missing_field("title"));
        }
        if self.store.find_column(column_id).is_none() {
            return Err(BoardError::ColumnNotFound {
                id: column_id.to_string(),
            });
        }
        draft.attachments.extend(self.upload_all(&uploads).await);
        draft.priority = Some(draft.priority.unwrap_or(self.config.default_priority));
        let created_by = self.current_user().await;

        let snapshot = self.store.snapshot();
        let local = self.store.create_task(column_id, draft)?;
        let appended = self
            .store
            .find_column(column_id)
            .map_or(true, |c| local.position + 1 == c.tasks.len());

        let payload = NewTask {
            project_id: self.project_id().clone(),
            column_id: column_id.clone(),
            title: local.title.clone(),
            description: local.description.clone(),
            status: local.status.clone(),
            priority: local.priority.unwrap_or(self.config.default_priority),
            assignee: local.assignee.clone(),
            attachments: local.attachments.clone(),
            position: local.position,
            created_by,
        };

        let record = match self.persistence.insert_task(payload).await {
            Ok(record) => record,
            Err(source) => {
                warn!(column = %column_id, error = %source, "Rolling back task creation");
                self.store.restore(snapshot);
                return Err(BoardError::persistence("create task", source));
            }
        };

        if !appended {
            let shifted: Vec<Write> = self
                .store
                .find_column(column_id)
                .map(|c| {
                    c.tasks
                        .iter()
                        .filter(|t| t.id != local.id && t.position > local.position)
                        .map(|t| Write::UpdateTask(t.id.clone(), TaskChanges::position(t.position)))
                        .collect()
                })
                .unwrap_or_default();
            let plan = WritePlan::none().stage(shifted);
            if let Err(source) = self.flush(&plan).await {
                warn!(column = %column_id, error = %source, "Rolling back task creation");
                self.store.restore(snapshot);
                if let Err(error) = self.persistence.delete_task(&record.id).await {
                    warn!(task = %record.id, %error, "Could not remove half-created task");
                }
                return Err(BoardError::persistence("create task", source));
            }
        }

        // Swap the temporary task for the stored one, keeping its slot.
        let position = local.position;
        self.store.delete_task(&local.id)?;
        let task = record.into_task();
        self.store
            .insert_task(column_id, task.clone(), Some(position))?;
        info!(task = %task.id, column = %column_id, "Created task");

        if self.config.refresh_after_create {
            if let Err(error) = self.refresh().await {
                warn!(%error, "Refresh after task creation failed");
            }
        }
        Ok(self.store.find_task(&task.id).cloned().unwrap_or(task))
    }

    /// Merge `patch` into a task, uploading any new attachments first
    pub async fn update_task(
        &mut self,
        task_id: &TaskId,
        mut patch: TaskPatch,
        uploads: Vec<AttachmentUpload>,
    ) -> Result<Task> {
        let current = self
            .store
            .find_task(task_id)
            .cloned()
            .ok_or_else(|| BoardError::TaskNotFound {
                id: task_id.to_string(),
            })?;

        let urls = self.upload_all(&uploads).await;
        if !urls.is_empty() {
            let mut attachments = patch
                .attachments
                .take()
                .unwrap_or_else(|| current.attachments.clone());
            attachments.extend(urls);
            patch.attachments = Some(attachments);
        }
        if patch.is_empty() {
            return Ok(current);
        }

        let id = task_id.clone();
        self.reconcile("update task", move |store| {
            let task = store.update_task(&id, &patch)?;
            let plan = WritePlan::none().stage(vec![Write::UpdateTask(
                id.clone(),
                TaskChanges::from(&patch),
            )]);
            Ok((task, plan))
        })
        .await
    }

    /// Delete a task; later siblings move up one slot
    pub async fn delete_task(&mut self, task_id: &TaskId) -> Result<Task> {
        let id = task_id.clone();
        self.reconcile("delete task", move |store| {
            let column_id = store
                .column_of(&id)
                .map(|c| c.id.clone())
                .ok_or_else(|| BoardError::TaskNotFound { id: id.to_string() })?;
            let removed = store.delete_task(&id)?;
            let shifted = store
                .find_column(&column_id)
                .map(|c| {
                    c.tasks[removed.position.min(c.tasks.len())..]
                        .iter()
                        .map(|t| Write::UpdateTask(t.id.clone(), TaskChanges::position(t.position)))
                        .collect()
                })
                .unwrap_or_default();
            let plan = WritePlan::none()
                .stage(vec![Write::DeleteTask(id.clone())])
                .stage(shifted);
            Ok((removed, plan))
        })
        .await
    }

    /// Move a task, possibly across columns. Returns whether anything changed.
    ///
    /// A cross-column move writes the task's new column and status first,
    /// then the complete order of both affected columns.
    pub async fn move_task(
        &mut self,
        task_id: &TaskId,
        source: &ColumnId,
        dest: &ColumnId,
        dest_index: Option<usize>,
    ) -> Result<bool> {
        let (id, source, dest) = (task_id.clone(), source.clone(), dest.clone());
        self.reconcile("move task", move |store| {
            if !store.move_task(&id, &source, &dest, dest_index)? {
                return Ok((false, WritePlan::none()));
            }
            let dest_column = store
                .find_column(&dest)
                .ok_or_else(|| BoardError::ColumnNotFound {
                    id: dest.to_string(),
                })?;
            if source == dest {
                return Ok((true, WritePlan::none().stage(column_positions(dest_column))));
            }

            let mut positions = column_positions(dest_column);
            if let Some(source_column) = store.find_column(&source) {
                positions.extend(column_positions(source_column));
            }
            let plan = WritePlan::none()
                .stage(vec![Write::TaskColumnAndStatus {
                    id: id.clone(),
                    column: dest.clone(),
                    status: dest_column.status.clone(),
                }])
                .stage(positions);
            Ok((true, plan))
        })
        .await
    }

    /// Apply a full task order to one column. Returns whether it changed.
    pub async fn reorder_tasks(&mut self, column_id: &ColumnId, order: &[TaskId]) -> Result<bool> {
        let column_id = column_id.clone();
        self.reconcile("reorder tasks", move |store| {
            if !store.reorder_tasks(&column_id, order)? {
                return Ok((false, WritePlan::none()));
            }
            let positions = store
                .find_column(&column_id)
                .map(column_positions)
                .unwrap_or_default();
            Ok((true, WritePlan::none().stage(positions)))
        })
        .await
    }

    // =========================================================================
    // Columns
    // =========================================================================

    /// Apply a full column order. Returns whether it changed.
    pub async fn reorder_columns(&mut self, order: &[ColumnId]) -> Result<bool> {
        self.reconcile("reorder columns", move |store| {
            if !store.reorder_columns(order)? {
                return Ok((false, WritePlan::none()));
            }
            let rows = column_order_rows(store.project());
            Ok((true, WritePlan::none().stage(vec![Write::ColumnOrder(rows)])))
        })
        .await
    }

    /// Append a new empty column
    pub async fn add_column(
        &mut self,
        title: impl Into<String>,
        status: TaskStatus,
        color: impl Into<String>,
    ) -> Result<Column> {
        let snapshot = self.store.snapshot();
        let local = self.store.add_column(Column::new(title, status, color))?;

        let payload = NewColumn {
            project_id: self.project_id().clone(),
            title: local.title.clone(),
            status: local.status.clone(),
            color: local.color.clone(),
            order: local.order,
        };
        let record = match self.persistence.insert_column(payload).await {
            Ok(record) => record,
            Err(source) => {
                warn!(error = %source, "Rolling back column creation");
                self.store.restore(snapshot);
                return Err(BoardError::persistence("add column", source));
            }
        };

        self.store.remove_column(&local.id)?;
        let column = self
            .store
            .add_column(local.with_id(record.id.clone()))?;
        info!(column = %column.id, order = column.order, "Added column");
        Ok(column)
    }

    /// Delete a column with its tasks and close the gap in column order
    pub async fn delete_column(&mut self, column_id: &ColumnId) -> Result<Column> {
        let column_id = column_id.clone();
        self.reconcile("delete column", move |store| {
            let removed = store.remove_column(&column_id)?;
            let rows = column_order_rows(store.project());
            let order_stage = if rows.is_empty() {
                Vec::new()
            } else {
                vec![Write::ColumnOrder(rows)]
            };
            let plan = WritePlan::none()
                .stage(vec![Write::DeleteColumn(column_id.clone())])
                .stage(order_stage);
            Ok((removed, plan))
        })
        .await
    }

    // =========================================================================
    // Protocol
    // =========================================================================

    /// Snapshot, mutate locally, persist, roll back on failure.
    async fn reconcile<T, F>(&mut self, action: &str, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut BoardStore) -> Result<(T, WritePlan)>,
    {
        let start = Instant::now();
        let snapshot = self.store.snapshot();

        let (value, plan) = match mutate(&mut self.store) {
            Ok(applied) => applied,
            Err(error) => {
                self.store.restore(snapshot);
                return Err(error);
            }
        };
        if plan.is_empty() {
            debug!(action, "Nothing to persist");
            return Ok(value);
        }

        if let Err(source) = self.flush(&plan).await {
            warn!(action, error = %source, "Rolling back optimistic update");
            self.store.restore(snapshot);
            return Err(BoardError::persistence(action, source));
        }

        debug!(
            action,
            writes = plan.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Persisted"
        );
        Ok(value)
    }

    /// Run the plan stage by stage; every row of a stage is awaited even if
    /// an earlier one failed.
    async fn flush(&self, plan: &WritePlan) -> std::result::Result<(), PersistenceError> {
        for stage in &plan.stages {
            let results = join_all(stage.iter().map(|write| self.send(write))).await;
            let mut failures = results.into_iter().filter_map(|r| r.err());
            if let Some(first) = failures.next() {
                let others = failures.count();
                warn!(
                    rows = stage.len(),
                    failed = others + 1,
                    "Write stage failed"
                );
                return Err(first);
            }
        }
        Ok(())
    }

    async fn send(&self, write: &Write) -> std::result::Result<(), PersistenceError> {
        match write {
            Write::UpdateTask(id, changes) => {
                self.persistence.update_task(id, changes).await.map(|_| ())
            }
            Write::DeleteTask(id) => self.persistence.delete_task(id).await,
            Write::TaskColumnAndStatus { id, column, status } => {
                self.persistence
                    .update_task_column_and_status(id, column, status)
                    .await
            }
            Write::ColumnOrder(rows) => self.persistence.upsert_column_order(rows).await,
            Write::DeleteColumn(id) => self.persistence.delete_column(id).await,
        }
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Upload files, keeping the URLs of the ones that succeeded
    async fn upload_all(&self, uploads: &[AttachmentUpload]) -> Vec<String> {
        let Some(storage) = &self.attachments else {
            if !uploads.is_empty() {
                warn!(count = uploads.len(), "No attachment storage configured; skipping uploads");
            }
            return Vec::new();
        };

        let mut urls = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let key = upload.storage_key();
            match storage
                .upload(&self.config.attachment_bucket, &key, upload)
                .await
            {
                Ok(url) => urls.push(url),
                Err(error) => {
                    warn!(file = %upload.file_name, %error, "Attachment upload failed");
                }
            }
        }
        urls
    }

    async fn current_user(&self) -> Option<String> {
        let identity = self.identity.as_ref()?;
        match identity.current_user_id().await {
            Ok(user) => user,
            Err(error) => {
                warn!(%error, "Could not resolve current user");
                None
            }
        }
    }
}
