use tokio_util::sync::CancellationToken;

use crate::identity::PeerId;
use crate::log_debug;
use crate::storage::{IPNS_PREFIX, Path};
use crate::utils::{IpfsError, Result, ensure_active};

use super::Namesys;
use super::record::{IpnsRecord, record_key};

impl Namesys {
    pub(super) async fn resolve_path(
        &self,
        cancel: &CancellationToken,
        name: &str,
        depth: usize,
    ) -> Result<Path> {
        ensure_active(cancel)?;
        let mut current = if name.starts_with('/') {
            Path::parse(name)?
        } else {
            Path::parse(&format!("{}{}", IPNS_PREFIX, name))?
        };

        let mut hops = 0;
        while current.is_ipns() {
            if hops == depth {
                return Err(IpfsError::UnresolvedIndirection(current.to_string()));
            }
            current = self.resolve_once(cancel, &current).await?;
            hops += 1;
        }
        Ok(current)
    }

    /// One `/ipns` hop; trailing segments carry over to the target.
    async fn resolve_once(&self, cancel: &CancellationToken, path: &Path) -> Result<Path> {
        let name: PeerId = path.root().parse().map_err(|_| {
            IpfsError::InvalidPath(format!("{} is not a peer ID", path.root()))
        })?;

        let bytes = match self.routing.get_value(cancel, &record_key(&name)).await {
            Ok(bytes) => bytes,
            Err(IpfsError::NotFound(_)) => {
                return Err(IpfsError::NotFound(format!("no record published for {}", name)));
            }
            Err(e) => return Err(e),
        };
        let record = IpnsRecord::decode(&bytes)?;
        record.verify(&name)?;

        let target = record.path()?;
        log_debug!(self.logger, "Resolved {} -> {}", name, target);
        Ok(target.join(path.segments()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::identity::Keypair;
    use crate::namesys::{IpnsValidator, NameSystem};
    use crate::routing::{OfflineRouting, RecordStore};
    use crate::storage::HashUtils;
    use crate::utils::NodeLogger;

    async fn namesys(dir: &std::path::Path) -> Namesys {
        let store = RecordStore::new(dir.join("datastore"));
        store.init().await.unwrap();
        let routing = Arc::new(OfflineRouting::new(store, Arc::new(IpnsValidator)));
        Namesys::new(routing, 3600, NodeLogger::process("test"))
    }

    #[tokio::test]
    async fn test_resolve_published_name() {
        let dir = tempfile::tempdir().unwrap();
        let ns = namesys(dir.path()).await;
        let cancel = CancellationToken::new();
        let key = Keypair::generate();
        let name = key.peer_id().unwrap().to_string();
        let target = Path::ipfs(&HashUtils::content_address(b"hello"));

        ns.publish(&cancel, &key, &target).await.unwrap();

        assert_eq!(ns.resolve_n(&cancel, &name, 1).await.unwrap(), target);
        let prefixed = format!("/ipns/{}/docs", name);
        assert_eq!(
            ns.resolve_n(&cancel, &prefixed, 1).await.unwrap(),
            target.join(&["docs".to_string()])
        );
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ns = namesys(dir.path()).await;
        let name = Keypair::generate().peer_id().unwrap().to_string();

        let result = ns.resolve_n(&CancellationToken::new(), &name, 1).await;
        assert!(matches!(result, Err(IpfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expired_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ns = namesys(dir.path()).await;
        let key = Keypair::generate();
        let name = key.peer_id().unwrap();
        let target = Path::ipfs(&HashUtils::content_address(b"stale"));

        let expired = IpnsRecord::create(&key, &target, 0, chrono::Duration::seconds(-1));
        RecordStore::new(dir.path().join("datastore"))
            .put(&record_key(&name), &expired.encode().unwrap())
            .await
            .unwrap();

        let result = ns
            .resolve_n(&CancellationToken::new(), &name.to_string(), 1)
            .await;
        assert!(matches!(result, Err(IpfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_chained_names_respect_depth() {
        let dir = tempfile::tempdir().unwrap();
        let ns = namesys(dir.path()).await;
        let cancel = CancellationToken::new();

        let inner = Keypair::generate();
        let outer = Keypair::generate();
        let target = Path::ipfs(&HashUtils::content_address(b"end"));
        let inner_name = inner.peer_id().unwrap().to_string();

        ns.publish(&cancel, &inner, &target).await.unwrap();
        ns.publish(&cancel, &outer, &Path::ipns(&inner_name))
            .await
            .unwrap();

        let outer_name = outer.peer_id().unwrap().to_string();
        assert!(matches!(
            ns.resolve_n(&cancel, &outer_name, 1).await,
            Err(IpfsError::UnresolvedIndirection(_))
        ));
        assert_eq!(ns.resolve_n(&cancel, &outer_name, 2).await.unwrap(), target);
    }

    #[tokio::test]
    async fn test_content_path_needs_no_hops() {
        let dir = tempfile::tempdir().unwrap();
        let ns = namesys(dir.path()).await;
        let target = Path::ipfs(&HashUtils::content_address(b"direct"));

        let resolved = ns
            .resolve_n(&CancellationToken::new(), &target.to_string(), 0)
            .await
            .unwrap();
        assert_eq!(resolved, target);
    }

    #[tokio::test]
    async fn test_cancelled_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let ns = namesys(dir.path()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let name = Keypair::generate().peer_id().unwrap().to_string();
        assert!(matches!(
            ns.resolve_n(&cancel, &name, 1).await,
            Err(IpfsError::Cancelled)
        ));
    }
}
