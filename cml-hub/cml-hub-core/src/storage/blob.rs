//! Opaque file contents, keyed by file id.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::model::FileId;

/// Trait for blob storage backends
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put(&self, id: FileId, data: &[u8]) -> Result<()>;
    async fn get(&self, id: FileId) -> Result<Vec<u8>>;
    async fn exists(&self, id: FileId) -> Result<bool>;
}

/// Blob store writing each file to `<dir>/<id>.<extension>`.
pub struct FsBlobStorage {
    dir: PathBuf,
    extension: String,
}

impl FsBlobStorage {
    /// Create a new store writing files to the given directory.
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            extension: extension.into(),
        })
    }

    fn path(&self, id: FileId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, self.extension))
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn put(&self, id: FileId, data: &[u8]) -> Result<()> {
        tokio::fs::write(self.path(id), data).await?;
        Ok(())
    }

    async fn get(&self, id: FileId) -> Result<Vec<u8>> {
        match tokio::fs::read(self.path(id)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(format!("Content of file {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: FileId) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(id)).await?)
    }
}

/// Simple in-memory blob store used for testing.
#[derive(Default)]
pub struct MemoryBlobStorage {
    data: Mutex<HashMap<FileId, Vec<u8>>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn put(&self, id: FileId, data: &[u8]) -> Result<()> {
        self.data.lock().insert(id, data.to_vec());
        Ok(())
    }

    async fn get(&self, id: FileId) -> Result<Vec<u8>> {
        self.data
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Content of file {}", id)))
    }

    async fn exists(&self, id: FileId) -> Result<bool> {
        Ok(self.data.lock().contains_key(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn fs_blobs_are_named_after_the_file_id() {
        let tempdir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStorage::new(tempdir.path(), "cml").unwrap();
        let id = Uuid::new_v4();
        blobs.put(id, b"<cml/>").await.unwrap();

        assert!(tempdir.path().join(format!("{}.cml", id)).exists());
        assert_eq!(blobs.get(id).await.unwrap(), b"<cml/>");
        assert!(blobs.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let tempdir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStorage::new(tempdir.path(), "cml").unwrap();
        let id = Uuid::new_v4();
        assert!(matches!(blobs.get(id).await, Err(Error::NotFound(_))));
        assert!(!blobs.exists(id).await.unwrap());

        let memory = MemoryBlobStorage::new();
        assert!(matches!(memory.get(id).await, Err(Error::NotFound(_))));
    }
}
