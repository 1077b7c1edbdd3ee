use tokio_util::sync::CancellationToken;

use crate::identity::Keypair;
use crate::storage::{DagNode, DagService, Path, PinMode, Pinner};
use crate::utils::{IpfsError, Result, ensure_active};
use crate::{log_debug, log_info, log_warn};

use super::record::{IpnsRecord, record_key};
use super::{NameSystem, Namesys};

impl Namesys {
    pub(super) async fn publish_record(
        &self,
        cancel: &CancellationToken,
        key: &Keypair,
        value: &Path,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let name = key.peer_id()?;
        let routing_key = record_key(&name);

        let sequence = match self.routing.get_value(cancel, &routing_key).await {
            Ok(bytes) => match IpnsRecord::decode(&bytes) {
                Ok(previous) => previous.sequence + 1,
                Err(_) => 0,
            },
            Err(IpfsError::Cancelled) => return Err(IpfsError::Cancelled),
            Err(IpfsError::NotFound(_)) => 0,
            Err(e) => {
                log_warn!(self.logger, "No previous record for {}: {}", name, e);
                0
            }
        };

        let record = IpnsRecord::create(key, value, sequence, self.record_lifetime);
        log_debug!(
            self.logger,
            "Publishing {} -> {} (seq {})",
            name,
            value,
            sequence
        );

        // Last chance to back out; once the write starts it runs to completion.
        ensure_active(cancel)?;
        match self.routing.put_value(cancel, &routing_key, record.encode()?).await {
            Ok(()) => {
                log_info!(self.logger, "Published {} -> {}", name, value);
                Ok(())
            }
            Err(IpfsError::Cancelled) => Err(IpfsError::Cancelled),
            Err(e) => Err(IpfsError::PublishTransport(format!(
                "publishing {} failed: {}",
                name, e
            ))),
        }
    }
}

/// Publishes an empty, recursively pinned directory under `key` so that a new
/// name resolves to something from the start.
pub async fn initialize_keyspace(
    cancel: &CancellationToken,
    namesys: &dyn NameSystem,
    dag: &DagService,
    pinner: &mut Pinner,
    key: &Keypair,
) -> Result<()> {
    let root = dag.put_node(&DagNode::empty_directory()).await?;
    pinner.pin(dag, &root, PinMode::Recursive).await?;
    pinner.flush().await?;

    namesys.publish(cancel, key, &Path::ipfs(&root)).await
}
