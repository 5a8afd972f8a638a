//! Task types: Task, TaskStatus, Priority, TaskPatch

use super::ids::TaskId;
use crate::error::{BoardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow status shared by a column and every task it holds.
///
/// The four built-in values cover the default board; projects may add their
/// own, which round-trip through `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Deployed,
    Custom(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Done => "done",
            Self::Deployed => "deployed",
            Self::Custom(s) => s,
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "todo" => Self::Todo,
            "in-progress" => Self::InProgress,
            "done" => Self::Done,
            "deployed" => Self::Deployed,
            _ => Self::Custom(s),
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Custom(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A task/card on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Always equal to the owning column's status
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Public URLs of uploaded attachments
    #[serde(default)]
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Index within the owning column, dense from zero once settled
    pub position: usize,
}

impl Task {
    /// Create a new task with a fresh id
    pub fn new(title: impl Into<String>, status: TaskStatus) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            title: title.into(),
            description: None,
            status,
            priority: None,
            assignee: None,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
            position: 0,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Override the id (used for rows that already have one)
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }
}

/// Field mask for task updates.
///
/// `None` leaves a field untouched. For clearable fields the inner option
/// distinguishes "set" from "clear". Status and position are deliberately
/// absent: those only change through move and reorder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Option<Priority>>,
    pub assignee: Option<Option<String>>,
    /// Replace all attachment references
    pub attachments: Option<Vec<String>>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_priority(mut self, priority: Option<Priority>) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_assignee(mut self, assignee: Option<String>) -> Self {
        self.assignee = Some(assignee);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
            && self.attachments.is_none()
    }

    /// Reject values that can never be stored
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(BoardError::invalid_value("title", "must not be blank"));
            }
        }
        Ok(())
    }

    /// Merge the present fields into `task` and refresh its update timestamp
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(assignee) = &self.assignee {
            task.assignee = assignee.clone();
        }
        if let Some(attachments) = &self.attachments {
            task.attachments = attachments.clone();
        }
        task.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_custom_values() {
        assert_eq!(TaskStatus::from("in-progress"), TaskStatus::InProgress);
        let custom = TaskStatus::from("blocked");
        assert_eq!(custom, TaskStatus::Custom("blocked".into()));

        let json = serde_json::to_string(&custom).unwrap();
        assert_eq!(json, "\"blocked\"");
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
    }

    #[test]
    fn test_priority_serialization() {
        assert_eq!(serde_json::to_string(&Priority::Urgent).unwrap(), "\"urgent\"");
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_patch_merges_only_present_fields() {
        let mut task = Task::new("Original", TaskStatus::Todo)
            .with_description("keep me")
            .with_priority(Priority::Low);
        task.position = 3;
        let before = task.updated_at;

        TaskPatch::new()
            .with_title("Renamed")
            .with_assignee(Some("user-1".into()))
            .apply_to(&mut task);

        assert_eq!(task.title, "Renamed");
        assert_eq!(task.description.as_deref(), Some("keep me"));
        assert_eq!(task.priority, Some(Priority::Low));
        assert_eq!(task.assignee.as_deref(), Some("user-1"));
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.position, 3);
        assert!(task.updated_at >= before);
    }

    #[test]
    fn test_patch_can_clear_fields() {
        let mut task = Task::new("T", TaskStatus::Todo).with_description("gone soon");
        TaskPatch::new().with_description(None).apply_to(&mut task);
        assert!(task.description.is_none());
    }

    #[test]
    fn test_patch_rejects_blank_title() {
        assert!(TaskPatch::new().with_title("  ").validate().is_err());
        assert!(TaskPatch::new().validate().is_ok());
        assert!(TaskPatch::new().is_empty());
    }
}
