// ABOUTME: Screenshot storage backends used by the execution writer
// ABOUTME: Filesystem backend writes per-execution screenshot files and returns file:// URLs

use async_trait::async_trait;
use std::path::PathBuf;
use vrooli_core::short_id;

use crate::error::{WriterError, WriterResult};

/// Location of a stored artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub size_bytes: i64,
}

#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Persist screenshot bytes. `Ok(None)` means the backend declined them.
    async fn store_screenshot(
        &self,
        execution_id: &str,
        step_index: i32,
        data: &[u8],
        media_type: &str,
    ) -> WriterResult<Option<StoredObject>>;
}

pub struct FilesystemArtifactStorage {
    root: PathBuf,
}

impl FilesystemArtifactStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStorage for FilesystemArtifactStorage {
    async fn store_screenshot(
        &self,
        execution_id: &str,
        step_index: i32,
        data: &[u8],
        media_type: &str,
    ) -> WriterResult<Option<StoredObject>> {
        if data.is_empty() {
            return Ok(None);
        }

        let dir = self.root.join(execution_id).join("screenshots");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WriterError::io(&dir, e))?;

        let file_name = format!(
            "step-{}-{}.{}",
            step_index,
            short_id(),
            extension_for(media_type)
        );
        let path = dir.join(file_name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| WriterError::io(&path, e))?;

        let absolute = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| WriterError::io(&path, e))?;

        Ok(Some(StoredObject {
            url: format!("file://{}", absolute.display()),
            thumbnail_url: None,
            size_bytes: data.len() as i64,
        }))
    }
}

fn extension_for(media_type: &str) -> &'static str {
    match media_type.trim().to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}
