use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;

use crate::identity::Keypair;
use crate::utils::{IpfsError, Result};

const KEY_TYPE: &str = "Ed25519";

/// Which key signs naming records for a session.
#[derive(Debug, Clone)]
pub enum KeySelection {
    /// The node's own identity from the repo config.
    UseDefault,
    UseOverride(Keypair),
}

impl KeySelection {
    pub fn resolve<'a>(&'a self, default: &'a Keypair) -> &'a Keypair {
        match self {
            KeySelection::UseDefault => default,
            KeySelection::UseOverride(key) => key,
        }
    }

    pub fn is_override(&self) -> bool {
        matches!(self, KeySelection::UseOverride(_))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyFile {
    #[serde(rename = "Type")]
    key_type: String,
    data: String,
}

/// Loads the key at `location`, generating and persisting one on first use.
///
/// An empty location selects the node's default identity. Creation is not
/// atomic: two processes racing on first use may both generate a key and the
/// last writer wins.
pub async fn load_or_create(location: &Path) -> Result<KeySelection> {
    if location.as_os_str().is_empty() {
        return Ok(KeySelection::UseDefault);
    }

    match async_fs::read(location).await {
        Ok(bytes) => parse_key_file(&bytes).map(KeySelection::UseOverride),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let keypair = Keypair::generate();
            write_key_file(location, &keypair).await?;
            Ok(KeySelection::UseOverride(keypair))
        }
        Err(e) => Err(IpfsError::KeyLoad(format!(
            "Failed to read {}: {}",
            location.display(),
            e
        ))),
    }
}

fn parse_key_file(bytes: &[u8]) -> Result<Keypair> {
    let file: KeyFile = serde_json::from_slice(bytes)
        .map_err(|e| IpfsError::CorruptKey(format!("unparseable key file: {}", e)))?;
    if file.key_type != KEY_TYPE {
        return Err(IpfsError::CorruptKey(format!(
            "unsupported key type {}",
            file.key_type
        )));
    }
    Keypair::from_secret_hex(&file.data)
}

async fn write_key_file(location: &Path, keypair: &Keypair) -> Result<()> {
    if let Some(parent) = location.parent().filter(|p| !p.as_os_str().is_empty()) {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| IpfsError::KeyLoad(format!("Failed to create key directory: {}", e)))?;
    }

    let body = serde_json::to_vec(&KeyFile {
        key_type: KEY_TYPE.to_string(),
        data: keypair.secret_hex(),
    })?;

    let mut options = async_fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(location)
        .await
        .map_err(|e| IpfsError::KeyLoad(format!("Failed to create {}: {}", location.display(), e)))?;
    file.write_all(&body)
        .await
        .map_err(|e| IpfsError::KeyLoad(format!("Failed to write key: {}", e)))?;
    file.flush()
        .await
        .map_err(|e| IpfsError::KeyLoad(format!("Failed to flush key: {}", e)))?;
    Ok(())
}
