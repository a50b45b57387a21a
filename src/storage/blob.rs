//! Blob storage for fetched page bodies
//!
//! Spiders write each page body once; scanners read it back through the
//! reference recorded in the task's fetch result.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

const SCHEME: &str = "blob://";

/// Errors that can occur while reading or writing blobs
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Invalid blob reference: {0}")]
    InvalidReference(String),

    #[error("Blob IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Location of a stored blob, written as `blob://{bucket}/{key}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub bucket: String,
    pub key: String,
}

impl BlobRef {
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Parses a reference recorded in a fetch result
    pub fn parse(reference: &str) -> Result<Self, BlobError> {
        let rest = reference
            .strip_prefix(SCHEME)
            .ok_or_else(|| BlobError::InvalidReference(reference.to_string()))?;

        match rest.split_once('/') {
            Some((bucket, key)) if is_safe_name(bucket) && is_safe_name(key) => {
                Ok(Self::new(bucket, key))
            }
            _ => Err(BlobError::InvalidReference(reference.to_string())),
        }
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.bucket, self.key)
    }
}

/// Bucket and key names must stay inside their directory
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && name != "." && name != ".."
}

/// Key under which a task's page body is stored
pub fn page_key(identifier: &str) -> String {
    format!("{}.html", identifier)
}

/// Durable byte storage addressed by bucket and key
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes a blob, replacing any previous content under the same key
    async fn put(
        &self,
        blob: &BlobRef,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BlobError>;

    /// Reads a blob
    async fn get(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError>;
}

/// Blob store backed by a directory per bucket
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, blob: &BlobRef) -> Result<PathBuf, BlobError> {
        if !is_safe_name(&blob.bucket) || !is_safe_name(&blob.key) {
            return Err(BlobError::InvalidReference(blob.to_string()));
        }
        Ok(self.root.join(&blob.bucket).join(&blob.key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        blob: &BlobRef,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BlobError> {
        let path = self.path_for(blob)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a partial body
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!("Stored {} ({} bytes, {})", blob, bytes.len(), content_type);
        Ok(())
    }

    async fn get(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(blob)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound {
                bucket: blob.bucket.clone(),
                key: blob.key.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process blob store
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        blob: &BlobRef,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), BlobError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| BlobError::InvalidReference(blob.to_string()))?;
        blobs.insert((blob.bucket.clone(), blob.key.clone()), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| BlobError::InvalidReference(blob.to_string()))?;
        blobs
            .get(&(blob.bucket.clone(), blob.key.clone()))
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                bucket: blob.bucket.clone(),
                key: blob.key.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reference_format() {
        let blob = BlobRef::new("term-project", &page_key("abc"));
        assert_eq!(blob.to_string(), "blob://term-project/abc.html");
        assert_eq!(BlobRef::parse("blob://term-project/abc.html").unwrap(), blob);
    }

    #[test]
    fn test_invalid_references() {
        assert!(BlobRef::parse("s3://bucket/key").is_err());
        assert!(BlobRef::parse("blob://bucket").is_err());
        assert!(BlobRef::parse("blob://bucket/a/b").is_err());
        assert!(BlobRef::parse("blob://../key").is_err());
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path());
        let blob = BlobRef::new("pages", "one.html");

        store.put(&blob, b"<html></html>", "text/html").await.unwrap();
        assert_eq!(store.get(&blob).await.unwrap(), b"<html></html>");
        assert!(dir.path().join("pages").join("one.html").exists());
    }

    #[tokio::test]
    async fn test_fs_store_missing_blob() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path());
        let result = store.get(&BlobRef::new("pages", "nope.html")).await;
        assert!(matches!(result, Err(BlobError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlobStore::new();
        let blob = BlobRef::new("pages", "one.html");
        assert!(store.get(&blob).await.is_err());

        store.put(&blob, b"body", "text/html").await.unwrap();
        assert_eq!(store.get(&blob).await.unwrap(), b"body");
        assert_eq!(store.len(), 1);
    }
}
