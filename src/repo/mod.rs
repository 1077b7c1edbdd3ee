//! On-disk repository: config, block and record directories, pin set and the
//! lock that keeps a repo owned by a single node.

pub mod assets;
pub mod config;
pub mod fsrepo;

pub use assets::seed_init_docs;
pub use config::{
    AddressesConfig, DEFAULT_SWARM_PORT, IdentityConfig, IpnsConfig, RepoConfig, RoutingConfig,
};
pub use fsrepo::{REPO_VERSION, Repo, init, is_initialized};
