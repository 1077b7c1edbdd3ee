use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::storage::HashUtils;
use crate::utils::{IpfsError, NodeLogger, Result};
use crate::{log_debug, log_info};

/// Tag stored as the first byte of every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Leaf bytes, stored as-is.
    Raw,
    /// A serialized [`DagNode`](crate::storage::DagNode).
    DagNode,
}

impl Codec {
    fn tag(self) -> u8 {
        match self {
            Codec::Raw => 0x55,
            Codec::DagNode => 0x70,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x55 => Some(Codec::Raw),
            0x70 => Some(Codec::DagNode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub codec: Codec,
    pub data: Vec<u8>,
}

impl Block {
    pub fn raw(data: Vec<u8>) -> Self {
        Self {
            codec: Codec::Raw,
            data,
        }
    }

    pub fn node(data: Vec<u8>) -> Self {
        Self {
            codec: Codec::DagNode,
            data,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 1);
        out.push(self.codec.tag());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let codec = bytes
            .first()
            .copied()
            .and_then(Codec::from_tag)
            .ok_or_else(|| IpfsError::SerializationError("unknown block codec".to_string()))?;
        Ok(Self {
            codec,
            data: bytes[1..].to_vec(),
        })
    }

    /// Content address over the encoded form, so raw and node blocks never
    /// collide.
    pub fn cid(&self) -> String {
        HashUtils::content_address(&self.encode())
    }
}

/// Flat directory of blocks keyed by content address.
#[derive(Clone)]
pub struct BlockStore {
    base_dir: PathBuf,
    logger: NodeLogger,
}

impl BlockStore {
    pub fn new(base_dir: PathBuf, logger: NodeLogger) -> Self {
        Self { base_dir, logger }
    }

    pub async fn init(&self) -> Result<()> {
        async_fs::create_dir_all(self.base_dir.join("temp"))
            .await
            .map_err(|e| IpfsError::IoError(format!("Failed to create block directory: {}", e)))?;

        log_info!(self.logger, "Block store initialized at: {:?}", self.base_dir);
        Ok(())
    }

    fn block_path(&self, cid: &str) -> PathBuf {
        self.base_dir.join(format!("{}.data", cid))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Writes through `temp/` and renames, so a reader never sees a torn block.
    pub async fn put(&self, block: &Block) -> Result<String> {
        let cid = block.cid();
        let path = self.block_path(&cid);
        if async_fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(cid);
        }

        let temp_path = self
            .base_dir
            .join("temp")
            .join(format!("{}.tmp", Uuid::new_v4()));
        let mut file = async_fs::File::create(&temp_path)
            .await
            .map_err(|e| IpfsError::IoError(format!("Failed to create block file: {}", e)))?;
        file.write_all(&block.encode())
            .await
            .map_err(|e| IpfsError::IoError(format!("Failed to write block: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| IpfsError::IoError(format!("Failed to flush block: {}", e)))?;
        drop(file);

        async_fs::rename(&temp_path, &path)
            .await
            .map_err(|e| IpfsError::IoError(format!("Failed to commit block: {}", e)))?;

        log_debug!(self.logger, "Stored block: {} ({} bytes)", cid, block.data.len());
        Ok(cid)
    }

    pub async fn get(&self, cid: &str) -> Result<Block> {
        let path = self.block_path(cid);
        let bytes = match async_fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IpfsError::BlockNotFound(cid.to_string()));
            }
            Err(e) => return Err(IpfsError::IoError(format!("Failed to read block: {}", e))),
        };

        if !HashUtils::verify_data(&bytes, cid) {
            return Err(IpfsError::BlockVerificationFailed(cid.to_string()));
        }

        log_debug!(self.logger, "Loaded block: {} ({} bytes)", cid, bytes.len());
        Block::decode(bytes)
    }

    pub async fn has(&self, cid: &str) -> bool {
        async_fs::try_exists(self.block_path(cid))
            .await
            .unwrap_or(false)
    }

    /// Drops half-written blocks left behind by an interrupted put.
    pub async fn cleanup_temp_files(&self) -> Result<()> {
        let temp_dir = self.base_dir.join("temp");

        if async_fs::try_exists(&temp_dir).await.unwrap_or(false) {
            async_fs::remove_dir_all(&temp_dir).await.map_err(|e| {
                IpfsError::IoError(format!("Failed to cleanup temp directory: {}", e))
            })?;
        }
        async_fs::create_dir_all(&temp_dir).await.map_err(|e| {
            IpfsError::IoError(format!("Failed to recreate temp directory: {}", e))
        })?;

        log_debug!(self.logger, "Cleaned up temporary block files");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, BlockStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::new(dir.path().join("blocks"), NodeLogger::process("test"));
        store.init().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get() {
        let (_dir, store) = store().await;
        let block = Block::raw(b"some bytes".to_vec());
        let cid = store.put(&block).await.unwrap();

        assert!(store.has(&cid).await);
        assert_eq!(store.get(&cid).await.unwrap(), block);

        // Same content, same address, no rewrite.
        assert_eq!(store.put(&block).await.unwrap(), cid);
    }

    #[tokio::test]
    async fn test_raw_and_node_differ() {
        let raw = Block::raw(b"{}".to_vec());
        let node = Block::node(b"{}".to_vec());
        assert_ne!(raw.cid(), node.cid());
    }

    #[tokio::test]
    async fn test_missing_and_tampered() {
        let (_dir, store) = store().await;
        let missing = HashUtils::content_address(b"nothing");
        assert!(matches!(
            store.get(&missing).await,
            Err(IpfsError::BlockNotFound(_))
        ));

        let cid = store.put(&Block::raw(b"original".to_vec())).await.unwrap();
        tokio::fs::write(store.block_path(&cid), b"\x55tampered")
            .await
            .unwrap();
        assert!(matches!(
            store.get(&cid).await,
            Err(IpfsError::BlockVerificationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_temp() {
        let (_dir, store) = store().await;
        let stray = store.base_dir().join("temp").join("stray.tmp");
        tokio::fs::write(&stray, b"x").await.unwrap();
        store.cleanup_temp_files().await.unwrap();
        assert!(!stray.exists());
        assert!(store.base_dir().join("temp").exists());
    }
}
