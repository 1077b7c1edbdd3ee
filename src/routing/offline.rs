use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::routing::{RecordStore, RecordValidator, Routing, prefer_incoming};
use crate::utils::{IpfsError, Result, ensure_active};

/// Routing that never leaves the local datastore. Used while bootstrapping a
/// repo and when a node is built with `online = false`.
pub struct OfflineRouting {
    store: RecordStore,
    validator: Arc<dyn RecordValidator>,
    write_lock: Mutex<()>,
}

impl OfflineRouting {
    pub fn new(store: RecordStore, validator: Arc<dyn RecordValidator>) -> Self {
        Self {
            store,
            validator,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Routing for OfflineRouting {
    async fn put_value(&self, cancel: &CancellationToken, key: &str, value: Vec<u8>) -> Result<()> {
        ensure_active(cancel)?;
        self.validator.validate(key, &value)?;

        let _guard = self.write_lock.lock().await;
        let current = self.store.get(key).await?;
        if !prefer_incoming(self.validator.as_ref(), key, current, &value)? {
            return Err(IpfsError::InvalidRecord(format!(
                "a newer record is already stored for {}",
                key
            )));
        }
        self.store.put(key, &value).await
    }

    async fn get_value(&self, cancel: &CancellationToken, key: &str) -> Result<Vec<u8>> {
        ensure_active(cancel)?;
        let value = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| IpfsError::NotFound(key.to_string()))?;
        // An expired or otherwise invalid record counts as no record.
        self.validator
            .validate(key, &value)
            .map_err(|e| IpfsError::NotFound(format!("{}: {}", key, e)))?;
        Ok(value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Accepts anything; prefers the longer value.
    pub(crate) struct LengthValidator;

    impl RecordValidator for LengthValidator {
        fn validate(&self, _key: &str, value: &[u8]) -> Result<()> {
            if value.is_empty() {
                return Err(IpfsError::InvalidRecord("empty".to_string()));
            }
            Ok(())
        }

        fn select(&self, _key: &str, values: &[Vec<u8>]) -> Result<usize> {
            values
                .iter()
                .enumerate()
                .max_by_key(|(i, v)| (v.len(), std::cmp::Reverse(*i)))
                .map(|(i, _)| i)
                .ok_or_else(|| IpfsError::NotFound("no values".to_string()))
        }
    }

    async fn routing() -> (tempfile::TempDir, OfflineRouting) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("datastore"));
        store.init().await.unwrap();
        (dir, OfflineRouting::new(store, Arc::new(LengthValidator)))
    }

    #[tokio::test]
    async fn test_put_get() {
        let (_dir, routing) = routing().await;
        let cancel = CancellationToken::new();

        assert!(matches!(
            routing.get_value(&cancel, "k").await,
            Err(IpfsError::NotFound(_))
        ));
        routing.put_value(&cancel, "k", b"ab".to_vec()).await.unwrap();
        routing.put_value(&cancel, "k", b"abc".to_vec()).await.unwrap();
        assert_eq!(routing.get_value(&cancel, "k").await.unwrap(), b"abc");

        // Worse record is refused, the better one stays.
        assert!(routing.put_value(&cancel, "k", b"a".to_vec()).await.is_err());
        assert_eq!(routing.get_value(&cancel, "k").await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_invalid_stored_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("datastore"));
        store.init().await.unwrap();
        store.put("k", b"").await.unwrap();
        let routing = OfflineRouting::new(store, Arc::new(LengthValidator));

        assert!(matches!(
            routing.get_value(&CancellationToken::new(), "k").await,
            Err(IpfsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_invalid_and_cancelled() {
        let (_dir, routing) = routing().await;
        let cancel = CancellationToken::new();
        assert!(routing.put_value(&cancel, "k", Vec::new()).await.is_err());

        cancel.cancel();
        assert!(matches!(
            routing.put_value(&cancel, "k", b"x".to_vec()).await,
            Err(IpfsError::Cancelled)
        ));
    }
}
