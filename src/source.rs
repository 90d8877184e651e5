//! Attachment retrieval boundary.
//!
//! Locating the export email and extracting its CSV attachment is the job of an external service;
//! the pipeline only needs the attachment bytes for a message id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Error returned by an [`AttachmentSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no attachment found for message '{message_id}'")]
    NotFound { message_id: String },

    #[error("failed to read attachment for message '{message_id}': {source}")]
    Io {
        message_id: String,
        #[source]
        source: std::io::Error,
    },

    /// The id cannot name an attachment (empty, or contains a path component).
    #[error("invalid message id '{message_id}'")]
    InvalidMessageId { message_id: String },
}

/// Supplies the raw CSV attachment of an export email.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    async fn fetch_attachment(&self, message_id: &str) -> Result<Vec<u8>, SourceError>;
}

/// Attachments held in memory, keyed by message id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttachmentSource {
    attachments: HashMap<String, Vec<u8>>,
}

impl InMemoryAttachmentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attachment(mut self, message_id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(message_id, bytes);
        self
    }

    pub fn insert(&mut self, message_id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.attachments.insert(message_id.into(), bytes.into());
    }
}

#[async_trait]
impl AttachmentSource for InMemoryAttachmentSource {
    async fn fetch_attachment(&self, message_id: &str) -> Result<Vec<u8>, SourceError> {
        self.attachments
            .get(message_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                message_id: message_id.to_string(),
            })
    }
}

/// Attachments stored as `<dir>/<message_id>.csv`.
#[derive(Debug, Clone)]
pub struct DirectoryAttachmentSource {
    dir: PathBuf,
}

impl DirectoryAttachmentSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the attachment for `message_id`.
    pub fn attachment_path(&self, message_id: &str) -> Result<PathBuf, SourceError> {
        let invalid = message_id.is_empty()
            || message_id.contains(['/', '\\'])
            || message_id.contains("..");
        if invalid {
            return Err(SourceError::InvalidMessageId {
                message_id: message_id.to_string(),
            });
        }
        Ok(self.dir.join(format!("{message_id}.csv")))
    }
}

#[async_trait]
impl AttachmentSource for DirectoryAttachmentSource {
    async fn fetch_attachment(&self, message_id: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.attachment_path(message_id)?;
        tracing::debug!(path = %path.display(), "reading attachment");
        tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound {
                    message_id: message_id.to_string(),
                }
            } else {
                SourceError::Io {
                    message_id: message_id.to_string(),
                    source,
                }
            }
        })
    }
}
