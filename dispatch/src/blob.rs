use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::DispatchError;

/// BlobStore hands submitted images from dispatchers to workers.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` for job `id` and return the reference a worker reads.
    async fn put(&self, id: &str, data: Bytes) -> Result<String, DispatchError>;

    async fn get(&self, reference: &str) -> Result<Bytes, DispatchError>;

    async fn delete(&self, reference: &str) -> Result<(), DispatchError>;
}

/// Reference under which job `id`'s image is stored.
pub fn blob_ref(id: &str) -> String {
    format!("{id}.img")
}

fn check_ref(reference: &str) -> Result<(), DispatchError> {
    let bad = reference.is_empty()
        || reference.starts_with('.')
        || reference.contains(['/', '\\', '\0']);
    if bad {
        return Err(DispatchError::Blob(format!("invalid reference {reference:?}")));
    }
    Ok(())
}

/// FsBlobStore keeps images as files in one directory.
///
/// The directory must be shared by dispatchers and workers.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path(&self, reference: &str) -> Result<PathBuf, DispatchError> {
        check_ref(reference)?;
        Ok(self.dir.join(reference))
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, id: &str, data: Bytes) -> Result<String, DispatchError> {
        let reference = blob_ref(id);
        let path = self.path(&reference)?;
        let tmp = path.with_extension("img.tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(reference)
    }

    async fn get(&self, reference: &str) -> Result<Bytes, DispatchError> {
        let data = tokio::fs::read(self.path(reference)?).await?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, reference: &str) -> Result<(), DispatchError> {
        match tokio::fs::remove_file(self.path(reference)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// MemoryBlobStore keeps images in process memory.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, id: &str, data: Bytes) -> Result<String, DispatchError> {
        let reference = blob_ref(id);
        check_ref(&reference)?;
        self.blobs.lock().insert(reference.clone(), data);
        Ok(reference)
    }

    async fn get(&self, reference: &str) -> Result<Bytes, DispatchError> {
        self.blobs
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| DispatchError::Blob(format!("{reference} not found")))
    }

    async fn delete(&self, reference: &str) -> Result<(), DispatchError> {
        self.blobs.lock().remove(reference);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("blobs")).await.unwrap();

        let r = store.put("c-1", Bytes::from_static(b"jpeg")).await.unwrap();
        assert_eq!(r, "c-1.img");
        assert!(dir.path().join("blobs/c-1.img").exists());
        assert_eq!(store.get(&r).await.unwrap(), "jpeg");

        store.delete(&r).await.unwrap();
        store.delete(&r).await.unwrap();
        assert!(store.get(&r).await.is_err());
    }

    #[tokio::test]
    async fn fs_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        assert!(store.get("../etc/passwd").await.is_err());
        assert!(store.get("a/b.img").await.is_err());
        assert!(store.put("../x", Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn memory_store() {
        let store = MemoryBlobStore::new();
        let r = store.put("c-2", Bytes::from_static(b"png")).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&r).await.unwrap(), "png");
        store.delete(&r).await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(store.get(&r).await, Err(DispatchError::Blob(_))));
    }
}
