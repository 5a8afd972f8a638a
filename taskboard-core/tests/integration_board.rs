//! Integration tests for drag-and-drop flows against the in-memory backend

use std::sync::Arc;
use taskboard_core::{
    BoardConfig, BoardError, BoardSession, BoardStore, Column, ColumnId, DragResolver,
    DropAction, MemoryPersistence, Persistence, PersistenceOp, Project, Task, TaskStatus,
};

fn column(id: &str, status: TaskStatus, tasks: &[&str]) -> Column {
    Column::new(id, status.clone(), "gray").with_id(id).with_tasks(
        tasks
            .iter()
            .map(|t| Task::new(*t, status.clone()).with_id(*t))
            .collect(),
    )
}

fn board() -> Project {
    let project = Project::new("Release").with_columns(vec![
        column("todo", TaskStatus::Todo, &["T1", "T2", "T3"]),
        column("done", TaskStatus::Done, &["T9"]),
    ]);
    BoardStore::new(project).project().clone()
}

async fn open(project: Project) -> (Arc<MemoryPersistence>, BoardSession) {
    let backend = Arc::new(MemoryPersistence::with_project(&project));
    let session = BoardSession::open(backend.clone(), &project.id, BoardConfig::default())
        .await
        .unwrap();
    (backend, session)
}

fn task_order(session: &BoardSession, column: &str) -> Vec<String> {
    session
        .store()
        .find_column(&column.into())
        .unwrap()
        .tasks
        .iter()
        .map(|t| t.id.to_string())
        .collect()
}

fn positions(session: &BoardSession, column: &str) -> Vec<usize> {
    session
        .store()
        .find_column(&column.into())
        .unwrap()
        .tasks
        .iter()
        .map(|t| t.position)
        .collect()
}

#[tokio::test]
async fn test_move_within_column_to_front() {
    let (backend, mut session) = open(board()).await;

    let changed = session
        .move_task(&"T2".into(), &"todo".into(), &"todo".into(), Some(0))
        .await
        .unwrap();
    assert!(changed);
    assert_eq!(task_order(&session, "todo"), vec!["T2", "T1", "T3"]);
    assert_eq!(positions(&session, "todo"), vec![0, 1, 2]);

    // Storage agrees after a full reload
    session.refresh().await.unwrap();
    assert_eq!(task_order(&session, "todo"), vec!["T2", "T1", "T3"]);
    assert!(backend
        .writes()
        .await
        .iter()
        .all(|(op, _)| *op == PersistenceOp::UpdateTask));
}

#[tokio::test]
async fn test_drop_task_before_task_in_other_column() {
    let (backend, mut session) = open(board()).await;
    let resolver = DragResolver::default();

    let action = resolver
        .handle_drop(&mut session, "T1", Some("T9"))
        .await
        .unwrap();
    assert!(matches!(action, DropAction::MoveTask { .. }));

    assert_eq!(task_order(&session, "todo"), vec!["T2", "T3"]);
    assert_eq!(positions(&session, "todo"), vec![0, 1]);
    assert_eq!(task_order(&session, "done"), vec!["T1", "T9"]);
    assert_eq!(
        session.store().find_task(&"T1".into()).unwrap().status,
        TaskStatus::Done
    );

    let (row, _) = backend.task_row(&"T1".into()).await.unwrap();
    assert_eq!(row.column_id.as_str(), "done");
    assert_eq!(row.status, TaskStatus::Done);
}

#[tokio::test]
async fn test_drop_last_column_before_first() {
    let project = Project::new("Columns").with_columns(vec![
        column("C1", TaskStatus::Todo, &[]),
        column("C2", TaskStatus::InProgress, &[]),
        column("C3", TaskStatus::Done, &[]),
    ]);
    let (backend, mut session) = open(BoardStore::new(project).project().clone()).await;
    let resolver = DragResolver::default();

    resolver
        .handle_drop(&mut session, "column-C3", Some("column-C1"))
        .await
        .unwrap();

    let ids: Vec<_> = session.project().columns.iter().map(|c| c.id.to_string()).collect();
    let orders: Vec<_> = session.project().columns.iter().map(|c| c.order).collect();
    assert_eq!(ids, vec!["C3", "C1", "C2"]);
    assert_eq!(orders, vec![0, 1, 2]);

    let stored = backend.list_columns(None).await.unwrap();
    let stored: Vec<_> = stored.iter().map(|c| (c.id.to_string(), c.order)).collect();
    assert_eq!(
        stored,
        vec![
            ("C3".to_string(), 0),
            ("C1".to_string(), 1),
            ("C2".to_string(), 2)
        ]
    );
}

#[tokio::test]
async fn test_column_move_is_relocation_not_swap() {
    let project = Project::new("Letters").with_columns(
        ["A", "B", "C", "D"]
            .iter()
            .map(|c| column(c, TaskStatus::from(*c), &[]))
            .collect(),
    );
    let (_, mut session) = open(BoardStore::new(project).project().clone()).await;

    DragResolver::default()
        .handle_drop(&mut session, "column-A", Some("column-C"))
        .await
        .unwrap();
    let ids: Vec<ColumnId> = session.project().column_ids();
    let ids: Vec<&str> = ids.iter().map(|c| c.as_str()).collect();
    assert_eq!(ids, vec!["B", "C", "A", "D"]);
}

#[tokio::test]
async fn test_cross_column_move_rolls_back_when_destination_write_fails() {
    let (backend, mut session) = open(board()).await;
    backend.fail_on(PersistenceOp::UpdateTask, Some("T9")).await;
    let before = session.project().clone();

    let result = DragResolver::default()
        .handle_drop(&mut session, "T1", Some("T9"))
        .await;
    assert!(matches!(result, Err(BoardError::Persistence { .. })));
    assert_eq!(session.project(), &before);
}

#[tokio::test]
async fn test_cross_column_move_rolls_back_when_source_write_fails() {
    let (backend, mut session) = open(board()).await;
    backend.fail_on(PersistenceOp::UpdateTask, Some("T2")).await;
    let before = session.project().clone();

    let result = session
        .move_task(&"T1".into(), &"todo".into(), &"done".into(), Some(0))
        .await;
    assert!(result.is_err());
    assert_eq!(session.project(), &before);

    // Other rows in the batch did land; a reload shows the drift
    backend.clear_failures().await;
    session.refresh().await.unwrap();
    assert!(session.store().find_column(&"done".into()).unwrap().contains(&"T1".into()));
}

#[tokio::test]
async fn test_cross_column_move_rolls_back_when_status_write_fails() {
    let (backend, mut session) = open(board()).await;
    backend
        .fail_once(PersistenceOp::UpdateTaskColumnAndStatus, None)
        .await;
    let before = session.project().clone();

    let result = session
        .move_task(&"T1".into(), &"todo".into(), &"done".into(), None)
        .await;
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(session.project(), &before);
    // The position stage never started
    assert!(backend.writes().await.is_empty());
}

#[tokio::test]
async fn test_drop_on_own_position_is_silent() {
    let (backend, mut session) = open(board()).await;
    let before = session.project().clone();

    let resolver = DragResolver::default();
    let action = resolver
        .handle_drop(&mut session, "T3", Some("column-todo"))
        .await
        .unwrap();
    assert_eq!(action, DropAction::None);
    let action = resolver.handle_drop(&mut session, "T2", None).await.unwrap();
    assert_eq!(action, DropAction::None);

    assert_eq!(session.project(), &before);
    assert!(backend.writes().await.is_empty());
}

#[tokio::test]
async fn test_reorder_with_current_order_is_identity() {
    let (backend, mut session) = open(board()).await;
    let before = session.project().clone();

    let current = session.store().find_column(&"todo".into()).unwrap().task_ids();
    let changed = session.reorder_tasks(&"todo".into(), &current).await.unwrap();
    assert!(!changed);
    assert_eq!(session.project(), &before);
    assert!(backend.writes().await.is_empty());
}

#[tokio::test]
async fn test_malformed_permutation_rejected_before_mutation() {
    let (backend, mut session) = open(board()).await;
    let before = session.project().clone();

    let result = session
        .reorder_tasks(&"todo".into(), &["T1".into(), "T2".into(), "T9".into()])
        .await;
    assert!(matches!(result, Err(BoardError::InvalidPermutation { .. })));
    let result = session.reorder_columns(&["todo".into()]).await;
    assert!(matches!(result, Err(BoardError::InvalidPermutation { .. })));

    assert_eq!(session.project(), &before);
    assert!(backend.writes().await.is_empty());
}
