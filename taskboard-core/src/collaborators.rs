//! Attachment storage and identity collaborators
//!
//! Both are only consulted while building persistence payloads: an upload
//! resolves to a public URL, the identity resolves to a user id string.

use crate::error::PersistenceError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// A file to attach to a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl AttachmentUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Storage key: `<unix millis>_<file name>`
    pub fn storage_key(&self) -> String {
        format!("{}_{}", Utc::now().timestamp_millis(), self.file_name)
    }
}

/// Uploads files and hands back a public reference URL
#[async_trait]
pub trait AttachmentStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        upload: &AttachmentUpload,
    ) -> Result<String, PersistenceError>;
}

/// Resolves the currently authenticated user
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means nobody is signed in
    async fn current_user_id(&self) -> Result<Option<String>, PersistenceError>;
}

/// Identity that always reports the same user (or nobody)
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<String>);

impl StaticIdentity {
    pub fn user(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user_id(&self) -> Result<Option<String>, PersistenceError> {
        Ok(self.0.clone())
    }
}

/// Keeps uploaded files in memory and serves `memory://bucket/key` URLs
#[derive(Debug, Default)]
pub struct MemoryAttachmentStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAttachmentStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.lock().await.is_empty()
    }
}

#[async_trait]
impl AttachmentStorage for MemoryAttachmentStorage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        upload: &AttachmentUpload,
    ) -> Result<String, PersistenceError> {
        if upload.bytes.is_empty() {
            return Err(PersistenceError::new(format!(
                "refusing empty upload '{}'",
                upload.file_name
            )));
        }
        let url = format!("memory://{}/{}", bucket, key);
        self.files
            .lock()
            .await
            .insert(url.clone(), upload.bytes.clone());
        Ok(url)
    }
}
