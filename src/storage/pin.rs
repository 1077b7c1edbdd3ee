use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::fs as async_fs;

use crate::storage::DagService;
use crate::utils::{IpfsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Direct,
    Recursive,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinState {
    recursive: BTreeSet<String>,
    direct: BTreeSet<String>,
}

/// Persistent pin set, saved as `pins.json` in the repo.
///
/// Pins are only written to disk on [`Pinner::flush`].
pub struct Pinner {
    path: PathBuf,
    state: PinState,
}

impl Pinner {
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = match async_fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PinState::default(),
            Err(e) => return Err(IpfsError::IoError(format!("Failed to read pins: {}", e))),
        };
        Ok(Self { path, state })
    }

    /// A recursive pin requires the whole DAG under `cid` to be present.
    pub async fn pin(&mut self, dag: &DagService, cid: &str, mode: PinMode) -> Result<()> {
        match mode {
            PinMode::Recursive => {
                dag.walk(cid).await?;
                self.state.direct.remove(cid);
                self.state.recursive.insert(cid.to_string());
            }
            PinMode::Direct => {
                if !dag.blocks().has(cid).await {
                    return Err(IpfsError::BlockNotFound(cid.to_string()));
                }
                if !self.state.recursive.contains(cid) {
                    self.state.direct.insert(cid.to_string());
                }
            }
        }
        Ok(())
    }

    pub fn unpin(&mut self, cid: &str) -> bool {
        let recursive = self.state.recursive.remove(cid);
        let direct = self.state.direct.remove(cid);
        recursive || direct
    }

    pub fn pin_mode(&self, cid: &str) -> Option<PinMode> {
        if self.state.recursive.contains(cid) {
            Some(PinMode::Recursive)
        } else if self.state.direct.contains(cid) {
            Some(PinMode::Direct)
        } else {
            None
        }
    }

    pub fn recursive_pins(&self) -> impl Iterator<Item = &String> {
        self.state.recursive.iter()
    }

    pub async fn flush(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.state)?;
        let temp = self.path.with_extension("json.tmp");
        async_fs::write(&temp, bytes)
            .await
            .map_err(|e| IpfsError::IoError(format!("Failed to write pins: {}", e)))?;
        async_fs::rename(&temp, &self.path)
            .await
            .map_err(|e| IpfsError::IoError(format!("Failed to commit pins: {}", e)))?;
        Ok(())
    }
}
