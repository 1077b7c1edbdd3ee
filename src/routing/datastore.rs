use std::path::PathBuf;
use tokio::fs as async_fs;
use uuid::Uuid;

use crate::utils::{IpfsError, Result};

/// One file per routing key under `datastore/`.
#[derive(Clone)]
pub struct RecordStore {
    base_dir: PathBuf,
}

impl RecordStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub async fn init(&self) -> Result<()> {
        async_fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| IpfsError::IoError(format!("Failed to create datastore: {}", e)))
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.rec", hex::encode(key.as_bytes())))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match async_fs::read(self.record_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IpfsError::IoError(format!("Failed to read record: {}", e))),
        }
    }

    /// Write-then-rename; once started, a put is never left half done.
    pub async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let temp = self.base_dir.join(format!("{}.tmp", Uuid::new_v4()));
        async_fs::write(&temp, value)
            .await
            .map_err(|e| IpfsError::IoError(format!("Failed to write record: {}", e)))?;
        async_fs::rename(&temp, self.record_path(key))
            .await
            .map_err(|e| IpfsError::IoError(format!("Failed to commit record: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("datastore"));
        store.init().await.unwrap();

        assert_eq!(store.get("/ipns/a").await.unwrap(), None);
        store.put("/ipns/a", b"one").await.unwrap();
        store.put("/ipns/a", b"two").await.unwrap();
        assert_eq!(store.get("/ipns/a").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.get("/ipns/b").await.unwrap(), None);
    }
}
