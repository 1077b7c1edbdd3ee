use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs as async_fs;

use super::config::RepoConfig;
use crate::utils::{IpfsError, Result};

pub const REPO_VERSION: u32 = 1;

const CONFIG_FILE: &str = "config";
const VERSION_FILE: &str = "version";
const LOCK_FILE: &str = "repo.lock";
const BLOCKS_DIR: &str = "blocks";
const DATASTORE_DIR: &str = "datastore";
const PINS_FILE: &str = "pins.json";

/// A repo is initialized once both its config and version files exist.
pub fn is_initialized(root: &Path) -> bool {
    root.join(CONFIG_FILE).is_file() && root.join(VERSION_FILE).is_file()
}

/// Lays out a fresh repo at `root`. Refuses to touch an initialized one.
pub async fn init(root: &Path, conf: &RepoConfig) -> Result<()> {
    if is_initialized(root) {
        return Err(IpfsError::RepoInit(format!(
            "{} is already initialized",
            root.display()
        )));
    }

    let io = |what: &str, e: std::io::Error| {
        IpfsError::RepoInit(format!("Failed to {} in {}: {}", what, root.display(), e))
    };

    async_fs::create_dir_all(root.join(BLOCKS_DIR).join("temp"))
        .await
        .map_err(|e| io("create block directory", e))?;
    async_fs::create_dir_all(root.join(DATASTORE_DIR))
        .await
        .map_err(|e| io("create datastore", e))?;

    let json = serde_json::to_vec_pretty(conf)?;
    let temp = root.join(format!("{}.tmp", CONFIG_FILE));
    async_fs::write(&temp, json)
        .await
        .map_err(|e| io("write config", e))?;
    async_fs::rename(&temp, root.join(CONFIG_FILE))
        .await
        .map_err(|e| io("commit config", e))?;

    // Written last: its presence marks the repo as complete.
    async_fs::write(root.join(VERSION_FILE), format!("{}\n", REPO_VERSION))
        .await
        .map_err(|e| io("write version", e))?;
    Ok(())
}

/// An open repo. Holds an exclusive lock on `repo.lock` until closed or
/// dropped, so two nodes never share one repo.
pub struct Repo {
    root: PathBuf,
    config: RepoConfig,
    lock: Mutex<Option<File>>,
}

impl Repo {
    pub async fn open(root: &Path) -> Result<Self> {
        if !is_initialized(root) {
            return Err(IpfsError::RepoOpen(format!(
                "no repo found at {}",
                root.display()
            )));
        }

        let version = async_fs::read_to_string(root.join(VERSION_FILE))
            .await
            .map_err(|e| IpfsError::RepoOpen(format!("Failed to read version: {}", e)))?;
        if version.trim() != REPO_VERSION.to_string() {
            return Err(IpfsError::RepoOpen(format!(
                "unsupported repo version {} (expected {})",
                version.trim(),
                REPO_VERSION
            )));
        }

        let lock = acquire_lock(root)?;

        let bytes = async_fs::read(root.join(CONFIG_FILE))
            .await
            .map_err(|e| IpfsError::RepoOpen(format!("Failed to read config: {}", e)))?;
        let config: RepoConfig = serde_json::from_slice(&bytes)
            .map_err(|e| IpfsError::RepoOpen(format!("Invalid repo config: {}", e)))?;

        Ok(Self {
            root: root.to_path_buf(),
            config,
            lock: Mutex::new(Some(lock)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn blocks_dir(&self) -> PathBuf {
        self.root.join(BLOCKS_DIR)
    }

    pub fn datastore_dir(&self) -> PathBuf {
        self.root.join(DATASTORE_DIR)
    }

    pub fn pins_path(&self) -> PathBuf {
        self.root.join(PINS_FILE)
    }

    pub fn is_open(&self) -> bool {
        self.lock.lock().map(|l| l.is_some()).unwrap_or(false)
    }

    /// Releases the repo lock. Safe to call more than once.
    pub fn close(&self) {
        let file = match self.lock.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(file) = file {
            let _ = FileExt::unlock(&file);
        }
    }
}

impl Drop for Repo {
    fn drop(&mut self) {
        self.close();
    }
}

fn acquire_lock(root: &Path) -> Result<File> {
    let lock_path = root.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| IpfsError::RepoOpen(format!("Failed to open repo lock: {}", e)))?;

    if let Err(err) = file.try_lock_exclusive() {
        return Err(IpfsError::RepoOpen(format!(
            "repo {} is locked by another process ({})",
            root.display(),
            err
        )));
    }

    file.set_len(0)?;
    writeln!(&file, "pid={}", std::process::id())?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        assert!(!is_initialized(&root));

        let conf = RepoConfig::init().unwrap();
        init(&root, &conf).await.unwrap();
        assert!(is_initialized(&root));
        assert!(root.join("blocks/temp").is_dir());
        assert!(root.join("datastore").is_dir());

        let repo = Repo::open(&root).await.unwrap();
        assert_eq!(repo.config().identity.peer_id, conf.identity.peer_id);
        assert!(repo.is_open());
    }

    #[tokio::test]
    async fn test_init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let conf = RepoConfig::init().unwrap();
        init(dir.path(), &conf).await.unwrap();
        assert!(matches!(
            init(dir.path(), &conf).await,
            Err(IpfsError::RepoInit(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_close() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), &RepoConfig::init().unwrap()).await.unwrap();

        let first = Repo::open(dir.path()).await.unwrap();
        assert!(matches!(
            Repo::open(dir.path()).await,
            Err(IpfsError::RepoOpen(_))
        ));

        first.close();
        first.close();
        assert!(!first.is_open());
        let second = Repo::open(dir.path()).await.unwrap();
        assert!(second.is_open());
    }

    #[tokio::test]
    async fn test_open_unparseable_config() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), &RepoConfig::init().unwrap()).await.unwrap();
        async_fs::write(dir.path().join(CONFIG_FILE), b"{ not json")
            .await
            .unwrap();

        assert!(matches!(
            Repo::open(dir.path()).await,
            Err(IpfsError::RepoOpen(_))
        ));
        // The lock taken before parsing is gone again.
        assert!(acquire_lock(dir.path()).is_ok());
    }

    #[tokio::test]
    async fn test_open_missing_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Repo::open(dir.path()).await,
            Err(IpfsError::RepoOpen(_))
        ));
    }
}
