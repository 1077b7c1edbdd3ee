//! First-run bootstrap of a repo: config, layout, default docs and an
//! initial naming record for the node identity.

use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::core::node::{BuildCfg, Node};
use crate::log_debug;
use crate::namesys::initialize_keyspace;
use crate::repo::{self, Repo, RepoConfig, seed_init_docs};
use crate::utils::{IpfsError, NodeLogger, Result};

/// Creates and populates a repo at `root`. Any failure is reported as
/// `RepoInit`.
pub async fn init(root: &Path, logger: &NodeLogger) -> Result<()> {
    run(root, logger).await.map_err(|e| match e {
        IpfsError::RepoInit(_) => e,
        other => IpfsError::RepoInit(other.to_string()),
    })
}

async fn run(root: &Path, logger: &NodeLogger) -> Result<()> {
    let conf = RepoConfig::init()?;
    repo::init(root, &conf).await?;

    add_default_assets(root, logger).await?;
    initialize_ipns_keyspace(root, logger).await
}

async fn offline_node(root: &Path, logger: &NodeLogger) -> Result<Node> {
    let repo = Repo::open(root).await?;
    Node::new(repo, BuildCfg::offline(), CancellationToken::new(), logger.clone()).await
}

async fn add_default_assets(root: &Path, logger: &NodeLogger) -> Result<()> {
    let node = offline_node(root, logger).await?;
    let cancel = CancellationToken::new();

    let docs = {
        let mut pins = node.pinner().lock().await;
        seed_init_docs(&cancel, node.dag(), &mut pins).await
    };
    node.close();

    let docs = docs.map_err(|e| IpfsError::RepoInit(format!("seeding init docs failed: {}", e)))?;
    log_debug!(logger, "init: seeded init docs {}", docs);
    Ok(())
}

async fn initialize_ipns_keyspace(root: &Path, logger: &NodeLogger) -> Result<()> {
    let node = offline_node(root, logger).await?;
    let cancel = CancellationToken::new();

    let result = {
        let mut pins = node.pinner().lock().await;
        initialize_keyspace(&cancel, node.namesys(), node.dag(), &mut pins, node.identity()).await
    };
    node.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namesys::NameSystem;
    use crate::utils::MemoryLog;

    #[tokio::test]
    async fn test_init_publishes_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemoryLog::new();
        let logger = NodeLogger::injected(sink.clone(), "init");

        init(dir.path(), &logger).await.unwrap();
        assert!(repo::is_initialized(dir.path()));
        assert!(sink.lines().iter().any(|l| l.contains("seeded init docs")));

        let node = offline_node(dir.path(), &logger).await.unwrap();
        let name = node.peer_id().to_string();
        let cancel = CancellationToken::new();
        let root = node.namesys().resolve_n(&cancel, &name, 1).await.unwrap();
        assert!(node.dag().get_node(root.root()).await.unwrap().links.is_empty());
    }

    #[tokio::test]
    async fn test_init_existing_repo_is_repo_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let logger = NodeLogger::process("init");
        init(dir.path(), &logger).await.unwrap();
        assert!(matches!(
            init(dir.path(), &logger).await,
            Err(IpfsError::RepoInit(_))
        ));
    }
}
