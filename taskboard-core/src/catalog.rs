//! Project catalog - listing, creating, editing and deleting projects
//!
//! The catalog keeps the most recently fetched project list (newest first)
//! and hands out [`BoardSession`]s for individual boards.

use crate::collaborators::{AttachmentStorage, IdentityProvider};
use crate::config::BoardConfig;
use crate::error::{BoardError, Result};
use crate::persistence::{load_projects, NewColumn, NewProject, Persistence};
use crate::reconcile::BoardSession;
use crate::types::{Project, ProjectId, ProjectPatch};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ProjectCatalog {
    persistence: Arc<dyn Persistence>,
    identity: Arc<dyn IdentityProvider>,
    attachments: Option<Arc<dyn AttachmentStorage>>,
    config: BoardConfig,
    projects: Vec<Project>,
}

impl ProjectCatalog {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        identity: Arc<dyn IdentityProvider>,
        config: BoardConfig,
    ) -> Self {
        Self {
            persistence,
            identity,
            attachments: None,
            config,
            projects: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Arc<dyn AttachmentStorage>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// Projects from the last fetch, newest first
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn find(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| &p.id == id)
    }

    /// Reload every project with its columns and live tasks
    pub async fn fetch_all(&mut self) -> Result<&[Project]> {
        self.projects = load_projects(self.persistence.as_ref()).await?;
        Ok(&self.projects)
    }

    /// Create a project owned by the current user, seeded with the configured
    /// default columns.
    pub async fn create_project(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Project> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BoardError::missing_field("name"));
        }
        let owner_id = self.require_user().await?;

        let record = self
            .persistence
            .insert_project(NewProject {
                name,
                description,
                owner_id,
            })
            .await
            .map_err(|e| BoardError::persistence("create project", e))?;

        let inserts = self
            .config
            .default_columns
            .iter()
            .enumerate()
            .map(|(order, template)| {
                self.persistence.insert_column(NewColumn {
                    project_id: record.id.clone(),
                    title: template.title.clone(),
                    status: template.status.clone(),
                    color: template.color.clone(),
                    order,
                })
            });
        let failure = join_all(inserts)
            .await
            .into_iter()
            .find_map(|r| r.err());

        if let Some(source) = failure {
            warn!(project = %record.id, error = %source, "Default columns failed; removing project");
            if let Err(error) = self.persistence.delete_project(&record.id).await {
                warn!(project = %record.id, %error, "Could not remove half-created project");
            }
            return Err(BoardError::persistence("create project columns", source));
        }
        info!(
            project = %record.id,
            columns = self.config.default_columns.len(),
            "Created project"
        );

        self.fetch_all().await?;
        self.find(&record.id)
            .cloned()
            .ok_or_else(|| BoardError::ProjectNotFound {
                id: record.id.to_string(),
            })
    }

    /// Rename a project or change its description
    pub async fn edit_project(&mut self, id: &ProjectId, patch: ProjectPatch) -> Result<Project> {
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(BoardError::invalid_value("name", "must not be blank"));
        }
        let record = self
            .persistence
            .update_project(id, &patch)
            .await
            .map_err(|e| BoardError::persistence("edit project", e))?;

        match self.projects.iter_mut().find(|p| &p.id == id) {
            Some(project) => {
                project.name = record.name;
                project.description = record.description;
                project.updated_at = record.updated_at;
                Ok(project.clone())
            }
            None => {
                self.fetch_all().await?;
                self.find(id)
                    .cloned()
                    .ok_or_else(|| BoardError::ProjectNotFound { id: id.to_string() })
            }
        }
    }

    /// Delete a project with its columns and tasks, then reload the list
    pub async fn delete_project(&mut self, id: &ProjectId) -> Result<()> {
        self.persistence
            .delete_project(id)
            .await
            .map_err(|e| BoardError::persistence("delete project", e))?;
        info!(project = %id, "Deleted project");
        self.fetch_all().await?;
        Ok(())
    }

    /// Open a board session on one project, with an initial fetch
    pub async fn open_board(&self, id: &ProjectId) -> Result<BoardSession> {
        let mut session =
            BoardSession::open(self.persistence.clone(), id, self.config.clone())
                .await?
                .with_identity(self.identity.clone());
        if let Some(attachments) = &self.attachments {
            session = session.with_attachments(attachments.clone());
        }
        Ok(session)
    }

    async fn require_user(&self) -> Result<String> {
        match self.identity.current_user_id().await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(BoardError::Identity {
                message: "sign in to create a project".to_string(),
            }),
            Err(error) => Err(BoardError::Identity {
                message: error.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticIdentity;
    use crate::persistence::{MemoryPersistence, PersistenceOp};
    use crate::types::TaskStatus;

    fn setup(identity: StaticIdentity) -> (Arc<MemoryPersistence>, ProjectCatalog) {
        let backend = Arc::new(MemoryPersistence::new());
        let catalog = ProjectCatalog::new(backend.clone(), Arc::new(identity), BoardConfig::default());
        (backend, catalog)
    }

    #[test_log::test(tokio::test)]
    async fn test_create_project_seeds_default_columns() {
        let (_, mut catalog) = setup(StaticIdentity::user("u1"));
        let project = catalog
            .create_project("Launch", Some("Q3".to_string()))
            .await
            .unwrap();

        let titles: Vec<_> = project.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["To Do", "In Progress", "Done", "Deployed"]);
        let orders: Vec<_> = project.columns.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
        assert_eq!(project.columns[1].status, TaskStatus::InProgress);
        assert_eq!(catalog.projects().len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_create_project_requires_user() {
        let (backend, mut catalog) = setup(StaticIdentity::anonymous());
        let result = catalog.create_project("Nope", None).await;
        assert!(matches!(result, Err(BoardError::Identity { .. })));
        assert!(backend.writes().await.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_create_project_column_failure_removes_project() {
        let (backend, mut catalog) = setup(StaticIdentity::user("u1"));
        backend.fail_once(PersistenceOp::InsertColumn, None).await;

        let result = catalog.create_project("Broken", None).await;
        assert!(matches!(result, Err(BoardError::Persistence { .. })));
        assert!(backend.list_projects().await.unwrap().is_empty());
        assert!(backend.list_columns(None).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_fetch_all_newest_first() {
        let (_, mut catalog) = setup(StaticIdentity::user("u1"));
        catalog.create_project("First", None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        catalog.create_project("Second", None).await.unwrap();

        let names: Vec<_> = catalog
            .fetch_all()
            .await
            .unwrap()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, vec!["Second", "First"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_edit_and_delete_project() {
        let (_, mut catalog) = setup(StaticIdentity::user("u1"));
        let project = catalog.create_project("Old", None).await.unwrap();

        let edited = catalog
            .edit_project(&project.id, ProjectPatch::default().with_name("New"))
            .await
            .unwrap();
        assert_eq!(edited.name, "New");
        assert_eq!(catalog.find(&project.id).unwrap().name, "New");

        let blank = catalog
            .edit_project(&project.id, ProjectPatch::default().with_name("  "))
            .await;
        assert!(blank.is_err());

        catalog.delete_project(&project.id).await.unwrap();
        assert!(catalog.projects().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_open_board() {
        let (_, mut catalog) = setup(StaticIdentity::user("u1"));
        let project = catalog.create_project("Board", None).await.unwrap();

        let session = catalog.open_board(&project.id).await.unwrap();
        assert_eq!(session.project().columns.len(), 4);

        let missing = catalog.open_board(&"nope".into()).await;
        assert!(matches!(missing, Err(BoardError::ProjectNotFound { .. })));
    }
}
