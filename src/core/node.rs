use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::identity::{Keypair, PeerId};
use crate::namesys::{IpnsValidator, NameSystem, Namesys};
use crate::repo::Repo;
use crate::routing::{DhtConfig, DhtNode, DhtRouting, OfflineRouting, RecordStore, Routing};
use crate::storage::{BlockStore, DagReader, DagService, Path, PinMode, Pinner};
use crate::utils::{IpfsError, NodeLogger, Result, ensure_active};
use crate::{log_debug, log_info, log_warn};

/// How a [`Node`] is wired up on top of an open repo.
#[derive(Clone, Debug, Default)]
pub struct BuildCfg {
    /// Join the DHT. Offline nodes keep records in the local datastore only.
    pub online: bool,
    pub listen_port: Option<u16>,
    pub bootstrap: Vec<SocketAddr>,
}

impl BuildCfg {
    pub fn offline() -> Self {
        Self::default()
    }
}

/// A node built from a repo: block store, DAG, pins, routing and names.
pub struct Node {
    repo: Repo,
    identity: Keypair,
    peer_id: PeerId,
    dag: DagService,
    pinner: Mutex<Pinner>,
    namesys: Namesys,
    dht: Option<Arc<DhtNode>>,
    resolve_depth: usize,
    cancel: CancellationToken,
    logger: NodeLogger,
}

impl Node {
    /// `cancel` bounds the node's background work; [`Node::close`] cancels it.
    pub async fn new(
        repo: Repo,
        cfg: BuildCfg,
        cancel: CancellationToken,
        logger: NodeLogger,
    ) -> Result<Self> {
        let config = repo.config().clone();
        let identity = config.keypair()?;
        let peer_id = identity.peer_id()?;

        let blocks = BlockStore::new(repo.blocks_dir(), logger.child("blocks"));
        blocks.init().await?;
        blocks.cleanup_temp_files().await?;
        let dag = DagService::new(blocks, logger.child("dag"));
        let pinner = Pinner::load(repo.pins_path()).await?;

        let records = RecordStore::new(repo.datastore_dir());
        records.init().await?;
        let validator = Arc::new(IpnsValidator);

        let (routing, dht) = if cfg.online {
            let mut bootstrap = cfg.bootstrap.clone();
            for peer in &config.bootstrap {
                match peer.to_socket_addrs() {
                    Ok(addrs) => bootstrap.extend(addrs),
                    Err(e) => log_warn!(logger, "Skipping bootstrap peer {}: {}", peer, e),
                }
            }

            let dht_config = DhtConfig {
                listen_port: cfg.listen_port.unwrap_or(config.addresses.swarm_port),
                bootstrap,
                query_timeout: Duration::from_secs(config.routing.query_timeout_secs),
                replication: config.routing.replication,
                ..DhtConfig::default()
            };
            let dht = DhtNode::bind(
                &peer_id,
                dht_config,
                records,
                validator,
                cancel.child_token(),
                logger.child("dht"),
            )
            .await
            .map_err(|e| IpfsError::NodeStart(e.to_string()))?;
            dht.start();
            let reached = dht.bootstrap().await;
            log_debug!(logger, "DHT bootstrap reached {} peers", reached);

            let routing: Arc<dyn Routing> = Arc::new(DhtRouting::new(dht.clone()));
            (routing, Some(dht))
        } else {
            let routing: Arc<dyn Routing> = Arc::new(OfflineRouting::new(records, validator));
            (routing, None)
        };

        let namesys = Namesys::new(
            routing,
            config.ipns.record_lifetime_secs,
            logger.child("namesys"),
        );

        log_info!(
            logger,
            "Node {} ready ({})",
            peer_id,
            if dht.is_some() { "online" } else { "offline" }
        );

        Ok(Self {
            repo,
            identity,
            peer_id,
            dag,
            pinner: Mutex::new(pinner),
            namesys,
            dht,
            resolve_depth: config.ipns.resolve_depth_limit,
            cancel,
            logger,
        })
    }

    pub fn identity(&self) -> &Keypair {
        &self.identity
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    pub fn dag(&self) -> &DagService {
        &self.dag
    }

    pub fn pinner(&self) -> &Mutex<Pinner> {
        &self.pinner
    }

    pub fn namesys(&self) -> &Namesys {
        &self.namesys
    }

    pub fn dht(&self) -> Option<&Arc<DhtNode>> {
        self.dht.as_ref()
    }

    pub fn is_online(&self) -> bool {
        self.dht.is_some()
    }

    /// Adds and recursively pins the content of `reader`.
    pub async fn add<R>(&self, cancel: &CancellationToken, reader: R) -> Result<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let cid = self.dag.add(cancel, reader).await?;

        let mut pins = self.pinner.lock().await;
        pins.pin(&self.dag, &cid, PinMode::Recursive).await?;
        pins.flush().await?;
        Ok(cid)
    }

    pub async fn add_file(&self, cancel: &CancellationToken, path: &FsPath) -> Result<String> {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            IpfsError::IoError(format!("Failed to open {}: {}", path.display(), e))
        })?;
        self.add(cancel, file).await
    }

    /// Address of the block a path ends at, following names and directory
    /// links.
    pub async fn resolve_path(&self, cancel: &CancellationToken, path: &Path) -> Result<String> {
        ensure_active(cancel)?;
        let resolved = if path.is_ipns() {
            self.namesys
                .resolve_n(cancel, &path.to_string(), self.resolve_depth)
                .await?
        } else {
            path.clone()
        };
        self.dag
            .resolve_segments(cancel, resolved.root(), resolved.segments())
            .await
    }

    pub async fn cat(&self, cancel: &CancellationToken, path: &Path) -> Result<DagReader> {
        let cid = self.resolve_path(cancel, path).await?;
        DagReader::open(self.dag.clone(), cancel.clone(), &cid).await
    }

    /// Stops background tasks and releases the repo. Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            log_debug!(self.logger, "Node {} closed", self.peer_id);
        }
        self.repo.close();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{self, RepoConfig};

    async fn offline_node(dir: &FsPath) -> Node {
        repo::init(dir, &RepoConfig::init().unwrap()).await.unwrap();
        let repo = Repo::open(dir).await.unwrap();
        Node::new(
            repo,
            BuildCfg::offline(),
            CancellationToken::new(),
            NodeLogger::process("test"),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_pins_and_cats() {
        let dir = tempfile::tempdir().unwrap();
        let node = offline_node(dir.path()).await;
        let cancel = CancellationToken::new();

        let cid = node.add(&cancel, &b"hello node"[..]).await.unwrap();
        assert_eq!(
            node.pinner().lock().await.pin_mode(&cid),
            Some(PinMode::Recursive)
        );

        let mut reader = node.cat(&cancel, &Path::ipfs(&cid)).await.unwrap();
        assert_eq!(reader.read_to_string().await.unwrap(), "hello node");
        assert!(!node.is_online());
    }

    #[tokio::test]
    async fn test_cat_through_name() {
        let dir = tempfile::tempdir().unwrap();
        let node = offline_node(dir.path()).await;
        let cancel = CancellationToken::new();

        let file = node.add(&cancel, &b"named"[..]).await.unwrap();
        let root = node
            .dag()
            .add_directory(vec![("file".to_string(), file, 5)])
            .await
            .unwrap();
        node.namesys()
            .publish(&cancel, node.identity(), &Path::ipfs(&root))
            .await
            .unwrap();

        let path = Path::parse(&format!("/ipns/{}/file", node.peer_id())).unwrap();
        let mut reader = node.cat(&cancel, &path).await.unwrap();
        assert_eq!(reader.read_to_string().await.unwrap(), "named");
    }

    #[tokio::test]
    async fn test_close_releases_repo() {
        let dir = tempfile::tempdir().unwrap();
        let node = offline_node(dir.path()).await;
        assert!(Repo::open(dir.path()).await.is_err());

        node.close();
        node.close();
        assert!(Repo::open(dir.path()).await.is_ok());
    }
}
