use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path as FsPath;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::core::config::Config;
use crate::core::init;
use crate::core::node::{BuildCfg, Node};
use crate::identity::{KeySelection, load_or_create};
use crate::namesys::NameSystem;
use crate::repo::{self, Repo};
use crate::storage::{DagReader, Path};
use crate::utils::{IpfsError, NodeLogger, Result, ensure_active};
use crate::{log_debug, log_error, log_info};

/// Hops followed by [`Session::resolve`]. A name pointing at another name is
/// reported rather than followed.
pub const RESOLVE_DEPTH: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopped,
}

/// A running node plus the identity names are published under.
///
/// Only [`Session::start`] builds one, so holding a `Session` means the node
/// got as far as running. After [`Session::stop`] every operation fails with
/// `Cancelled`.
pub struct Session {
    node: Node,
    key: KeySelection,
    cancel: CancellationToken,
    logger: NodeLogger,
}

impl Session {
    /// Bootstraps the repo on first use, opens it, loads the publishing key
    /// and brings the node up.
    pub async fn start(config: Config, logger: NodeLogger) -> Result<Self> {
        let repo_dir = config.repo_dir.as_path();
        if !repo::is_initialized(repo_dir) {
            log_info!(logger, "Creating IPFS repo at {}", repo_dir.display());
            init::init(repo_dir, &logger).await?;
        }

        let repo = Repo::open(repo_dir).await?;
        let key = load_or_create(&config.key_file).await?;
        let bootstrap = parse_bootstrap(&config.bootstrap)?;

        let cancel = CancellationToken::new();
        let build = BuildCfg {
            online: config.online,
            listen_port: config.listen_port,
            bootstrap,
        };
        let node = Node::new(repo, build, cancel.child_token(), logger.clone())
            .await
            .map_err(|e| {
                log_error!(logger, "Failed to start node: {}", e);
                match e {
                    IpfsError::NodeStart(_) | IpfsError::ConfigError(_) => e,
                    other => IpfsError::NodeStart(other.to_string()),
                }
            })?;

        log_info!(
            logger,
            "Session started for {} (publishing as {})",
            node.peer_id(),
            if key.is_override() { "override key" } else { "node key" }
        );

        Ok(Self {
            node,
            key,
            cancel,
            logger,
        })
    }

    pub fn state(&self) -> SessionState {
        if self.cancel.is_cancelled() {
            SessionState::Stopped
        } else {
            SessionState::Running
        }
    }

    /// Cancels in-flight work, stops the DHT and releases the repo lock.
    /// Calling it again does nothing.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.node.close();
        log_info!(self.logger, "Session stopped");
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// The node's own peer ID.
    pub fn peer_id(&self) -> String {
        self.node.peer_id().to_string()
    }

    /// Port the DHT socket is bound to, when online.
    pub fn listen_port(&self) -> Option<u16> {
        self.node.dht().map(|dht| dht.local_addr().port())
    }

    pub async fn add(&self, data: &str) -> Result<String> {
        self.add_bytes(data.as_bytes()).await
    }

    pub async fn add_bytes(&self, data: &[u8]) -> Result<String> {
        self.add_reader(data).await
    }

    pub async fn add_reader<R>(&self, reader: R) -> Result<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        ensure_active(&self.cancel)?;
        self.node.add(&self.cancel, reader).await
    }

    pub async fn add_file(&self, path: &FsPath) -> Result<String> {
        ensure_active(&self.cancel)?;
        self.node.add_file(&self.cancel, path).await
    }

    pub async fn get_file(&self, path: &str) -> Result<DagReader> {
        ensure_active(&self.cancel)?;
        let path = Path::parse(path)?;
        self.node.cat(&self.cancel, &path).await
    }

    pub async fn get(&self, path: &str) -> Result<String> {
        let mut reader = self.get_file(path).await?;
        let content = reader.read_to_string().await;
        reader.close()?;
        content
    }

    /// Points the selected key's name at `reference` and returns that name.
    pub async fn publish(&self, reference: &str) -> Result<String> {
        ensure_active(&self.cancel)?;
        let path = Path::parse(reference)?;
        let key = self.key.resolve(self.node.identity());

        self.node.namesys().publish(&self.cancel, key, &path).await?;
        let name = key.peer_id()?.to_string();
        log_debug!(self.logger, "Published {} under {}", path, name);
        Ok(name)
    }

    /// Looks up what `name` points at, following a single hop.
    pub async fn resolve(&self, name: &str) -> Result<String> {
        ensure_active(&self.cancel)?;
        let path = self
            .node
            .namesys()
            .resolve_n(&self.cancel, name, RESOLVE_DEPTH)
            .await?;
        Ok(path.to_plain_string())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn parse_bootstrap(peers: &[String]) -> Result<Vec<SocketAddr>> {
    let mut addrs = Vec::with_capacity(peers.len());
    for peer in peers {
        let resolved = peer.to_socket_addrs().map_err(|e| {
            IpfsError::ConfigError(format!("invalid bootstrap peer {}: {}", peer, e))
        })?;
        addrs.extend(resolved);
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn offline_session(dir: &FsPath) -> Session {
        let config = Config {
            online: false,
            ..Config::new(dir.join("repo"))
        };
        Session::start(config, NodeLogger::process("test")).await.unwrap()
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let session = offline_session(dir.path()).await;
        assert_eq!(session.state(), SessionState::Running);
        assert!(session.listen_port().is_none());

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_default_key_publishes_as_node() {
        let dir = tempfile::tempdir().unwrap();
        let session = offline_session(dir.path()).await;
        let cid = session.add("x").await.unwrap();

        let name = session.publish(&cid).await.unwrap();
        assert_eq!(name, session.peer_id());
        assert_eq!(session.resolve(&name).await.unwrap(), cid);
    }

    #[tokio::test]
    async fn test_publish_rejects_bad_reference() {
        let dir = tempfile::tempdir().unwrap();
        let session = offline_session(dir.path()).await;
        assert!(matches!(
            session.publish("/nope/abc").await,
            Err(IpfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_parse_bootstrap() {
        let addrs = parse_bootstrap(&["127.0.0.1:4001".to_string()]).unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:4001".parse::<SocketAddr>().unwrap()]);
        assert!(matches!(
            parse_bootstrap(&["not an address".to_string()]),
            Err(IpfsError::ConfigError(_))
        ));
    }
}
