//! Error types for the board engine

use thiserror::Error;

/// Result type for board operations
pub type Result<T> = std::result::Result<T, BoardError>;

/// Broad classification of a persistence failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceErrorKind {
    /// The referenced row does not exist in the backing store
    NotFound,
    /// The write conflicted with existing data
    Conflict,
    /// The backing store could not be reached or timed out
    Unavailable,
    /// Anything else
    Other,
}

/// Error reported by the persistence, attachment or identity collaborators
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PersistenceError {
    pub kind: PersistenceErrorKind,
    pub message: String,
}

impl PersistenceError {
    /// Create an error of kind `Other`
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: PersistenceErrorKind::Other,
            message: message.into(),
        }
    }

    /// Create an error with an explicit kind
    pub fn with_kind(kind: PersistenceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::with_kind(PersistenceErrorKind::NotFound, format!("{} not found", what))
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::with_kind(PersistenceErrorKind::Unavailable, message)
    }
}

/// Errors that can occur in board operations
#[derive(Debug, Error)]
pub enum BoardError {
    /// Project not found
    #[error("project not found: {id}")]
    ProjectNotFound { id: String },

    /// Column not found in the current snapshot
    #[error("column not found: {id}")]
    ColumnNotFound { id: String },

    /// Task not found in the current snapshot
    #[error("task not found: {id}")]
    TaskNotFound { id: String },

    /// Task exists but not in the column the caller named
    #[error("task '{task}' is not in column '{column}'")]
    TaskNotInColumn { task: String, column: String },

    /// An ordering did not match current membership
    #[error("invalid {scope} order: {message}")]
    InvalidPermutation { scope: String, message: String },

    /// Duplicate ID
    #[error("duplicate {item_type} ID: {id}")]
    DuplicateId { item_type: String, id: String },

    /// Missing required field
    #[error("missing required field: {field}")]
    MissingField { field: String },

    /// Invalid field value
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// A durable write failed; local state was rolled back before this was returned
    #[error("persistence failure during {action}: {source}")]
    Persistence {
        action: String,
        #[source]
        source: PersistenceError,
    },

    /// No authenticated user was available
    #[error("no authenticated user: {message}")]
    Identity { message: String },

    /// Configuration could not be loaded or was invalid
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl BoardError {
    /// Create an invalid permutation error
    pub fn invalid_permutation(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPermutation {
            scope: scope.into(),
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate ID error
    pub fn duplicate_id(item_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            item_type: item_type.into(),
            id: id.into(),
        }
    }

    /// Wrap a collaborator failure with the logical action it belonged to
    pub fn persistence(action: impl Into<String>, source: PersistenceError) -> Self {
        Self::Persistence {
            action: action.into(),
            source,
        }
    }

    /// True for not-found errors against the local snapshot
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProjectNotFound { .. }
                | Self::ColumnNotFound { .. }
                | Self::TaskNotFound { .. }
                | Self::TaskNotInColumn { .. }
        )
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Persistence { source, .. } if source.kind == PersistenceErrorKind::Unavailable
        )
    }
}
