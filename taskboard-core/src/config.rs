//! Board configuration using Figment
//!
//! Sources are merged in precedence order (later sources override earlier ones):
//! 1. Compiled defaults
//! 2. `taskboard.toml`, `taskboard.yaml`/`taskboard.yml`, `taskboard.json` in the
//!    search directory, in that order
//! 3. Environment variables with the `TASKBOARD_` prefix

use crate::types::{ColumnTemplate, Priority};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, trace};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TASKBOARD_";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the schema
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value was readable but not acceptable
    #[error("invalid configuration value for {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Settings for board sessions and the project catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Reserved prefix that marks a drag id as a column handle
    pub column_handle_prefix: String,
    /// Priority given to new tasks that do not name one
    pub default_priority: Priority,
    /// Columns inserted into every new project
    pub default_columns: Vec<ColumnTemplate>,
    /// Re-read the board after creating a task to pick up server ids
    pub refresh_after_create: bool,
    /// Re-read the board after a drop that wrote to storage
    pub refresh_after_drop: bool,
    /// Bucket that task attachments are uploaded into
    pub attachment_bucket: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            column_handle_prefix: "column-".to_string(),
            default_priority: Priority::Medium,
            default_columns: ColumnTemplate::defaults(),
            refresh_after_create: true,
            refresh_after_drop: true,
            attachment_bucket: "task-attachments".to_string(),
        }
    }
}

impl BoardConfig {
    /// Load from the current directory and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_dir(".")
    }

    /// Load from config files in `dir` and the environment
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        debug!(dir = %dir.display(), "Loading board configuration");

        let mut figment = Figment::new().merge(Serialized::defaults(BoardConfig::default()));

        let toml = dir.join("taskboard.toml");
        if toml.is_file() {
            trace!(path = %toml.display(), "Merging TOML config");
            figment = figment.merge(Toml::file(toml));
        }
        for name in ["taskboard.yaml", "taskboard.yml"] {
            let yaml = dir.join(name);
            if yaml.is_file() {
                trace!(path = %yaml.display(), "Merging YAML config");
                figment = figment.merge(Yaml::file(yaml));
            }
        }
        let json = dir.join("taskboard.json");
        if json.is_file() {
            trace!(path = %json.display(), "Merging JSON config");
            figment = figment.merge(Json::file(json));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX));
        Self::extract(figment)
    }

    /// Load from defaults plus one explicit file, ignoring the environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let base = Figment::new().merge(Serialized::defaults(BoardConfig::default()));
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => base.merge(Yaml::file(path)),
            Some("json") => base.merge(Json::file(path)),
            _ => base.merge(Toml::file(path)),
        };
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: BoardConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.column_handle_prefix.is_empty() {
            return Err(ConfigError::invalid(
                "column_handle_prefix",
                "must not be empty",
            ));
        }
        // Generated ids are ULIDs, so a purely alphanumeric prefix could match a task id
        if self
            .column_handle_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::invalid(
                "column_handle_prefix",
                "must contain a character that cannot appear in an id, such as '-' or ':'",
            ));
        }
        if self.attachment_bucket.trim().is_empty() {
            return Err(ConfigError::invalid("attachment_bucket", "must not be empty"));
        }
        let mut titles = HashSet::new();
        for column in &self.default_columns {
            if column.title.trim().is_empty() {
                return Err(ConfigError::invalid("default_columns", "column title is empty"));
            }
            if !titles.insert(column.title.as_str()) {
                return Err(ConfigError::invalid(
                    "default_columns",
                    format!("duplicate column title '{}'", column.title),
                ));
            }
        }
        Ok(())
    }
}
