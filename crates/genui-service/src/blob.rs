// ABOUTME: Blob storage boundary for generated artifacts
// ABOUTME: Filesystem store with content-type sidecars, plus an in-memory store

use async_trait::async_trait;
use dashmap::DashMap;
use genui_core::GenerationId;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONTENT_TYPE_SUFFIX: &str = ".content-type";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError>;

    /// `Ok(None)` when nothing is stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Blob>, BlobError>;
}

/// Key under which the final artifact of generation `id` is stored.
pub fn artifact_key(namespace: &str, id: GenerationId) -> String {
    format!("{}/generations/{}.html", namespace.trim_matches('/'), id)
}

fn validate_key(key: &str) -> Result<(), BlobError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.ends_with(CONTENT_TYPE_SUFFIX)
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Blob>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        validate_key(key)?;
        self.blobs.insert(
            key.to_string(),
            Blob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>, BlobError> {
        validate_key(key)?;
        Ok(self.blobs.get(key).map(|blob| blob.value().clone()))
    }
}

/// Blobs stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn sidecar(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(CONTENT_TYPE_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tokio::fs::write(sidecar(&path), content_type.as_bytes()).await?;

        tracing::debug!(key, bytes = bytes.len(), "Blob stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>, BlobError> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content_type = tokio::fs::read_to_string(sidecar(&path))
            .await
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| DEFAULT_CONTENT_TYPE.to_string());

        Ok(Some(Blob {
            bytes,
            content_type,
        }))
    }
}
