//! Mutable names (`/ipns/<peer id>`) on top of the routing layer.
//!
//! A name is the peer ID of a keypair. Publishing signs an [`IpnsRecord`]
//! pointing at a path and hands it to [`Routing`]; resolving fetches the best
//! record for the name and follows it for a bounded number of hops.

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::identity::Keypair;
use crate::routing::Routing;
use crate::storage::Path;
use crate::utils::{NodeLogger, Result};

mod publisher;
mod record;
mod resolver;

pub use publisher::initialize_keyspace;
pub use record::{IPNS_KEY_PREFIX, IpnsRecord, IpnsValidator, record_key};

/// Hop limit used when resolving `/ipns` paths for content reads.
pub const DEFAULT_DEPTH_LIMIT: usize = 32;
pub const DEFAULT_RECORD_LIFETIME_SECS: u64 = 24 * 60 * 60;
const MAX_RECORD_LIFETIME_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[async_trait]
pub trait NameSystem: Send + Sync {
    /// Binds the name derived from `key` to `value`, superseding any earlier
    /// record for that name.
    async fn publish(&self, cancel: &CancellationToken, key: &Keypair, value: &Path) -> Result<()>;

    /// Follows `/ipns` indirections starting at `name` for at most `depth`
    /// hops. Running out of hops on an `/ipns` path is `UnresolvedIndirection`.
    async fn resolve_n(&self, cancel: &CancellationToken, name: &str, depth: usize)
    -> Result<Path>;
}

pub struct Namesys {
    routing: Arc<dyn Routing>,
    record_lifetime: Duration,
    logger: NodeLogger,
}

impl Namesys {
    pub fn new(routing: Arc<dyn Routing>, record_lifetime_secs: u64, logger: NodeLogger) -> Self {
        let secs = record_lifetime_secs.min(MAX_RECORD_LIFETIME_SECS) as i64;
        Self {
            routing,
            record_lifetime: Duration::seconds(secs),
            logger,
        }
    }
}

#[async_trait]
impl NameSystem for Namesys {
    async fn publish(&self, cancel: &CancellationToken, key: &Keypair, value: &Path) -> Result<()> {
        self.publish_record(cancel, key, value).await
    }

    async fn resolve_n(
        &self,
        cancel: &CancellationToken,
        name: &str,
        depth: usize,
    ) -> Result<Path> {
        self.resolve_path(cancel, name, depth).await
    }
}
