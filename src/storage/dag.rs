use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::log_debug;
use crate::storage::{Block, BlockStore, Chunker, Codec};
use crate::utils::{IpfsError, NodeLogger, Result, ensure_active, until_cancelled};

/// Fan-out of interior file nodes.
pub const MAX_LINKS: usize = 174;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub hash: String,
    /// Content bytes reachable through this link.
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    pub kind: NodeKind,
    pub links: Vec<Link>,
}

impl DagNode {
    pub fn empty_directory() -> Self {
        Self {
            kind: NodeKind::Directory,
            links: Vec::new(),
        }
    }

    pub fn content_size(&self) -> u64 {
        self.links.iter().map(|l| l.size).sum()
    }

    pub fn to_block(&self) -> Result<Block> {
        Ok(Block::node(serde_json::to_vec(self)?))
    }

    pub fn from_block(block: &Block) -> Result<Self> {
        if block.codec != Codec::DagNode {
            return Err(IpfsError::SerializationError(
                "raw block is not a DAG node".to_string(),
            ));
        }
        Ok(serde_json::from_slice(&block.data)?)
    }
}

/// One raw leaf of a file, in content order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSpan {
    pub hash: String,
    pub offset: u64,
    pub size: u64,
}

/// Merkle-DAG layer over the block store.
#[derive(Clone)]
pub struct DagService {
    blocks: BlockStore,
    logger: NodeLogger,
}

impl DagService {
    pub fn new(blocks: BlockStore, logger: NodeLogger) -> Self {
        Self { blocks, logger }
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    pub async fn put_node(&self, node: &DagNode) -> Result<String> {
        self.blocks.put(&node.to_block()?).await
    }

    pub async fn get_node(&self, cid: &str) -> Result<DagNode> {
        let block = self.blocks.get(cid).await?;
        DagNode::from_block(&block)
    }

    /// Chunks `reader` into raw leaves and builds a balanced file tree over
    /// them. Returns the root address; a single-chunk file is its own root.
    ///
    /// Waiting on `reader` races the token; a block write in progress always
    /// finishes.
    pub async fn add<R>(&self, cancel: &CancellationToken, reader: R) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunker = Chunker::new(reader);
        let mut level: Vec<Link> = Vec::new();

        while let Some(leaf) = until_cancelled(cancel, chunker.next_chunk()).await? {
            ensure_active(cancel)?;
            let size = leaf.data.len() as u64;
            let hash = self.blocks.put(&leaf).await?;
            level.push(Link {
                name: String::new(),
                hash,
                size,
            });
        }

        while level.len() > 1 {
            let mut parents = Vec::with_capacity(level.len() / MAX_LINKS + 1);
            for group in level.chunks(MAX_LINKS) {
                ensure_active(cancel)?;
                let node = DagNode {
                    kind: NodeKind::File,
                    links: group.to_vec(),
                };
                let size = node.content_size();
                let hash = self.put_node(&node).await?;
                parents.push(Link {
                    name: String::new(),
                    hash,
                    size,
                });
            }
            level = parents;
        }

        let root = level
            .pop()
            .ok_or_else(|| IpfsError::IoError("chunker produced no chunks".to_string()))?;
        log_debug!(self.logger, "Added file {} ({} bytes)", root.hash, root.size);
        Ok(root.hash)
    }

    /// Builds a flat directory from already-added entries.
    pub async fn add_directory(&self, entries: Vec<(String, String, u64)>) -> Result<String> {
        let mut links: Vec<Link> = entries
            .into_iter()
            .map(|(name, hash, size)| Link { name, hash, size })
            .collect();
        links.sort_by(|a, b| a.name.cmp(&b.name));

        let node = DagNode {
            kind: NodeKind::Directory,
            links,
        };
        self.put_node(&node).await
    }

    /// Follows named directory links from `root`.
    pub async fn resolve_segments(
        &self,
        cancel: &CancellationToken,
        root: &str,
        segments: &[String],
    ) -> Result<String> {
        let mut current = root.to_string();
        for segment in segments {
            ensure_active(cancel)?;
            let node = self.get_node(&current).await.map_err(|e| match e {
                IpfsError::SerializationError(_) => {
                    IpfsError::NotFound(format!("{} has no link named {}", current, segment))
                }
                other => other,
            })?;
            if node.kind != NodeKind::Directory {
                return Err(IpfsError::NotFound(format!(
                    "{} is not a directory",
                    current
                )));
            }
            current = node
                .links
                .iter()
                .find(|l| &l.name == segment)
                .map(|l| l.hash.clone())
                .ok_or_else(|| {
                    IpfsError::NotFound(format!("{} has no link named {}", current, segment))
                })?;
        }
        Ok(current)
    }

    /// Flattens the file rooted at `cid` into its leaves without reading
    /// leaf data.
    pub async fn leaves(&self, cancel: &CancellationToken, cid: &str) -> Result<Vec<LeafSpan>> {
        let root = self.blocks.get(cid).await?;
        if root.codec == Codec::Raw {
            return Ok(vec![LeafSpan {
                hash: cid.to_string(),
                offset: 0,
                size: root.data.len() as u64,
            }]);
        }

        let node = DagNode::from_block(&root)?;
        if node.kind == NodeKind::Directory {
            return Err(IpfsError::InvalidPath(format!("{} is a directory", cid)));
        }

        let mut spans = Vec::new();
        let mut offset = 0u64;
        let mut stack: Vec<Link> = node.links.into_iter().rev().collect();
        while let Some(link) = stack.pop() {
            ensure_active(cancel)?;
            let block = self.blocks.get(&link.hash).await?;
            match block.codec {
                Codec::Raw => {
                    let size = block.data.len() as u64;
                    spans.push(LeafSpan {
                        hash: link.hash,
                        offset,
                        size,
                    });
                    offset += size;
                }
                Codec::DagNode => {
                    let child = DagNode::from_block(&block)?;
                    stack.extend(child.links.into_iter().rev());
                }
            }
        }
        Ok(spans)
    }

    /// Every block address reachable from `cid`, `cid` included.
    pub async fn walk(&self, cid: &str) -> Result<Vec<String>> {
        let mut seen = Vec::new();
        let mut stack = vec![cid.to_string()];
        while let Some(next) = stack.pop() {
            if seen.contains(&next) {
                continue;
            }
            let block = self.blocks.get(&next).await?;
            if block.codec == Codec::DagNode {
                let node = DagNode::from_block(&block)?;
                stack.extend(node.links.into_iter().map(|l| l.hash));
            }
            seen.push(next);
        }
        Ok(seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn dag() -> (tempfile::TempDir, DagService) {
        let dir = tempfile::tempdir().unwrap();
        let logger = NodeLogger::process("test");
        let blocks = BlockStore::new(dir.path().join("blocks"), logger.clone());
        blocks.init().await.unwrap();
        (dir, DagService::new(blocks, logger))
    }

    #[tokio::test]
    async fn test_small_file_is_single_leaf() {
        let (_dir, dag) = dag().await;
        let cancel = CancellationToken::new();
        let cid = dag.add(&cancel, &b"42"[..]).await.unwrap();

        let leaves = dag.leaves(&cancel, &cid).await.unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].hash, cid);
        assert_eq!(leaves[0].size, 2);
    }

    #[tokio::test]
    async fn test_multi_chunk_file() {
        let (_dir, dag) = dag().await;
        let cancel = CancellationToken::new();
        let data = vec![7u8; crate::storage::CHUNK_SIZE * 2 + 10];
        let cid = dag.add(&cancel, &data[..]).await.unwrap();

        let root = dag.get_node(&cid).await.unwrap();
        assert_eq!(root.kind, NodeKind::File);
        assert_eq!(root.links.len(), 3);
        assert_eq!(root.content_size(), data.len() as u64);

        let leaves = dag.leaves(&cancel, &cid).await.unwrap();
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[2].offset, (crate::storage::CHUNK_SIZE * 2) as u64);
        assert_eq!(leaves[2].size, 10);

        // Two identical full chunks share one block.
        assert_eq!(dag.walk(&cid).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_directory_resolution() {
        let (_dir, dag) = dag().await;
        let cancel = CancellationToken::new();
        let readme = dag.add(&cancel, &b"read me"[..]).await.unwrap();
        let dir = dag
            .add_directory(vec![("readme".to_string(), readme.clone(), 7)])
            .await
            .unwrap();

        let found = dag
            .resolve_segments(&cancel, &dir, &["readme".to_string()])
            .await
            .unwrap();
        assert_eq!(found, readme);

        let missing = dag
            .resolve_segments(&cancel, &dir, &["nope".to_string()])
            .await;
        assert!(matches!(missing, Err(IpfsError::NotFound(_))));

        assert!(matches!(
            dag.leaves(&cancel, &dir).await,
            Err(IpfsError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_add_observes_cancellation() {
        let (_dir, dag) = dag().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = dag.add(&cancel, &b"late"[..]).await;
        assert!(matches!(res, Err(IpfsError::Cancelled)));
    }
}
