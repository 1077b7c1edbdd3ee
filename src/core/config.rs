use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repo_dir: PathBuf,
    /// Key file for publishing. Empty means publish as the node itself.
    pub key_file: PathBuf,
    pub online: bool,
    /// Overrides the repo's swarm port; `Some(0)` picks a free one.
    pub listen_port: Option<u16>,
    /// Extra DHT peers (`host:port`) on top of the repo's bootstrap list.
    pub bootstrap: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("./.mini-ipfs"),
            key_file: PathBuf::new(),
            online: true,
            listen_port: None,
            bootstrap: Vec::new(),
        }
    }
}

impl Config {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>) -> Self {
        self.key_file = key_file.into();
        self
    }
}
