//! Key-value routing used by the naming system.
//!
//! Two backends: [`OfflineRouting`] keeps records in the local datastore only,
//! [`DhtRouting`] additionally replicates them to and looks them up from the
//! closest peers of a Kademlia-style DHT.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::utils::Result;

pub mod datastore;
pub mod dht;
pub mod offline;

pub use datastore::RecordStore;
pub use dht::{DhtConfig, DhtNode, DhtRouting};
pub use offline::OfflineRouting;

/// Decides whether a record may be stored under a key and which of several
/// candidate records is authoritative.
pub trait RecordValidator: Send + Sync {
    fn validate(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Index of the best record in `values`. Every value has already passed
    /// [`RecordValidator::validate`].
    fn select(&self, key: &str, values: &[Vec<u8>]) -> Result<usize>;
}

#[async_trait]
pub trait Routing: Send + Sync {
    /// Validates and stores `value`, replacing the current record only when
    /// the validator prefers the new one.
    async fn put_value(&self, cancel: &CancellationToken, key: &str, value: Vec<u8>) -> Result<()>;

    /// Best known record for `key`, or `NotFound`.
    async fn get_value(&self, cancel: &CancellationToken, key: &str) -> Result<Vec<u8>>;
}

/// Keeps `incoming` unless `current` is strictly preferred by the validator.
pub(crate) fn prefer_incoming(
    validator: &dyn RecordValidator,
    key: &str,
    current: Option<Vec<u8>>,
    incoming: &[u8],
) -> Result<bool> {
    let Some(current) = current else {
        return Ok(true);
    };
    if validator.validate(key, &current).is_err() {
        return Ok(true);
    }
    let candidates = vec![incoming.to_vec(), current];
    Ok(validator.select(key, &candidates)? == 0)
}
